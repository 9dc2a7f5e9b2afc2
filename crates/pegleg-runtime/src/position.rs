use std::fmt::Debug;

/// Representation of the current input position.
///
/// Parsers are generic over this so that the cheap [`Offset`] can be used
/// when line information is not needed.
pub trait Position: Clone + Default + Debug {
    /// Whether actions and predicates receive the line and column.
    const TRACKS_LINES: bool;

    /// Byte offset into the input.
    fn offset(&self) -> usize;

    /// Moves the position past `consumed`, which must be the input text
    /// directly following the current offset.
    fn advance(&mut self, consumed: &str);

    /// Line and column, both 1-based, if they are tracked.
    fn line_column(&self) -> Option<(usize, usize)>;
}

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Offset(pub usize);

impl Position for Offset {
    const TRACKS_LINES: bool = false;

    #[inline]
    fn offset(&self) -> usize {
        self.0
    }

    #[inline]
    fn advance(&mut self, consumed: &str) {
        self.0 += consumed.len();
    }

    #[inline]
    fn line_column(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Position that keeps the line and column up to date as characters are consumed.
///
/// `\n`, `\r`, `\r\n`, U+2028 and U+2029 all end a line, `\r\n` counts once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LineColumn {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub seen_cr: bool,
}

impl Default for LineColumn {
    fn default() -> Self {
        LineColumn {
            offset: 0,
            line: 1,
            column: 1,
            seen_cr: false,
        }
    }
}

impl LineColumn {
    /// Computes the position of `offset` by scanning `input` from the start.
    pub fn at(input: &str, offset: usize) -> LineColumn {
        let mut pos = LineColumn::default();
        pos.advance(&input[..offset]);
        pos
    }

    fn step(&mut self, ch: char) {
        match ch {
            '\n' => {
                if !self.seen_cr {
                    self.line += 1;
                }
                self.column = 1;
                self.seen_cr = false;
            }
            '\r' | '\u{2028}' | '\u{2029}' => {
                self.line += 1;
                self.column = 1;
                self.seen_cr = true;
            }
            _ => {
                self.column += 1;
                self.seen_cr = false;
            }
        }
        self.offset += ch.len_utf8();
    }
}

impl Position for LineColumn {
    const TRACKS_LINES: bool = true;

    #[inline]
    fn offset(&self) -> usize {
        self.offset
    }

    fn advance(&mut self, consumed: &str) {
        for ch in consumed.chars() {
            self.step(ch);
        }
    }

    #[inline]
    fn line_column(&self) -> Option<(usize, usize)> {
        Some((self.line, self.column))
    }
}

#[test]
fn test_line_breaks() {
    let input = "a\nb\r\nc\rd\u{2028}e\n\nf";
    let expected = [
        ('a', 1, 1),
        ('b', 2, 1),
        ('c', 3, 1),
        ('d', 4, 1),
        ('e', 5, 1),
        ('f', 7, 1),
    ];
    for (ch, line, column) in expected {
        let offset = input.find(ch).unwrap();
        let pos = LineColumn::at(input, offset);
        assert_eq!((pos.line, pos.column), (line, column), "at {ch:?}");
    }

    let pos = LineColumn::at("xyz", 2);
    assert_eq!((pos.offset, pos.line, pos.column), (2, 1, 3));
}

#[test]
fn test_incremental_matches_scan() {
    let input = "ab\r\n\u{e9}\u{2029}cd";
    let mut pos = LineColumn::default();
    let mut offset = 0;
    for ch in input.chars() {
        let len = ch.len_utf8();
        pos.advance(&input[offset..offset + len]);
        offset += len;
        assert_eq!(pos, LineColumn::at(input, offset));
    }
}
