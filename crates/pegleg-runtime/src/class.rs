#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassPart {
    Char(char),
    /// Inclusive range, the start is never greater than the end.
    Range(char, char),
}

impl ClassPart {
    #[inline]
    pub fn contains(self, ch: char) -> bool {
        match self {
            ClassPart::Char(c) => c == ch,
            ClassPart::Range(start, end) => start <= ch && ch <= end,
        }
    }
}

/// A bracketed character class such as `[^a-z_]i`.
#[derive(Clone, Copy, Debug)]
pub struct CharClass<'a> {
    pub parts: &'a [ClassPart],
    pub inverted: bool,
    pub ignore_case: bool,
}

impl<'a> CharClass<'a> {
    pub fn matches(&self, ch: char) -> bool {
        let mut hit = self.contains(ch);
        if !hit && self.ignore_case {
            hit = single(ch.to_lowercase()).is_some_and(|c| self.contains(c))
                || single(ch.to_uppercase()).is_some_and(|c| self.contains(c));
        }
        hit != self.inverted
    }

    fn contains(&self, ch: char) -> bool {
        self.parts.iter().any(|part| part.contains(ch))
    }
}

// case mappings that expand to several characters cannot match a single class member
fn single(mut chars: impl Iterator<Item = char>) -> Option<char> {
    let first = chars.next()?;
    match chars.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[test]
fn test_char_class() {
    let digits = [ClassPart::Range('0', '9')];
    let class = CharClass {
        parts: &digits,
        inverted: false,
        ignore_case: false,
    };
    assert!(class.matches('0'));
    assert!(class.matches('9'));
    assert!(!class.matches('a'));

    let inverted = CharClass {
        inverted: true,
        ..class
    };
    assert!(!inverted.matches('5'));
    assert!(inverted.matches('x'));

    let letters = [ClassPart::Range('a', 'f'), ClassPart::Char('_')];
    let folded = CharClass {
        parts: &letters,
        inverted: false,
        ignore_case: true,
    };
    assert!(folded.matches('C'));
    assert!(folded.matches('_'));
    assert!(!folded.matches('G'));

    // `[]` never matches, `[^]` matches anything
    let empty = CharClass {
        parts: &[],
        inverted: false,
        ignore_case: false,
    };
    assert!(!empty.matches('a'));
    assert!(CharClass {
        inverted: true,
        ..empty
    }
    .matches('a'));
}
