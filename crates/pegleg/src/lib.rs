pub mod ast;
pub mod error;
mod parser;

use std::ops::Index;

pub use error::GrammarError;
pub use parser::parse;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct StrSpan {
    pub start: u32,
    pub end: u32,
}

impl StrSpan {
    /// Offsets past `u32::MAX` are clamped, so spans in grammar text over
    /// 4 GiB are not exact.
    pub fn new(start: usize, end: usize) -> StrSpan {
        StrSpan {
            start: start.try_into().unwrap_or(u32::MAX),
            end: end.try_into().unwrap_or(u32::MAX),
        }
    }
    #[inline]
    pub fn as_str(self, src: &str) -> &str {
        &src[self.start as usize..self.end as usize]
    }
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }
    pub fn len(self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

impl Index<StrSpan> for str {
    type Output = str;
    fn index(&self, index: StrSpan) -> &Self::Output {
        &self[index.start as usize..index.end as usize]
    }
}

#[test]
fn test_span_clamping() {
    let span = StrSpan::new(3, 7);
    assert_eq!((span.start, span.end, span.len()), (3, 7, 4));
    assert_eq!(span.as_str("abcdefghij"), "defg");

    #[cfg(target_pointer_width = "64")]
    {
        let span = StrSpan::new(1, u32::MAX as usize + 10);
        assert_eq!(span.end, u32::MAX);
    }
}
