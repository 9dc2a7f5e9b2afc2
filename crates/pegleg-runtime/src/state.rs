use std::collections::HashMap;

use serde_json::Value;

use crate::{
    error::SyntaxError,
    position::{LineColumn, Offset, Position},
    CharClass, ANY_CHARACTER,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    rule: usize,
    offset: usize,
    reporting: bool,
}

struct CacheEntry<P> {
    end: P,
    result: Option<Value>,
}

/// Mutable context of one parse call.
///
/// Matchers advance the position on success and leave it untouched on
/// failure. Failures are recorded at the rightmost position reached, only
/// while no enclosing context has silenced them.
pub struct State<'a, P: Position = Offset> {
    input: &'a str,
    pos: P,

    silenced: u32,
    failure_pos: P,
    expected: Vec<String>,

    cache: Option<HashMap<CacheKey, CacheEntry<P>>>,
}

impl<'a, P: Position> State<'a, P> {
    pub fn new(input: &'a str) -> State<'a, P> {
        State {
            input,
            pos: P::default(),
            silenced: 0,
            failure_pos: P::default(),
            expected: Vec::new(),
            cache: None,
        }
    }

    /// Creates a state that memoizes rule results by start position.
    pub fn with_cache(input: &'a str) -> State<'a, P> {
        State {
            cache: Some(HashMap::new()),
            ..State::new(input)
        }
    }

    #[inline]
    pub fn input(&self) -> &'a str {
        self.input
    }

    #[inline]
    pub fn pos(&self) -> &P {
        &self.pos
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.pos.offset()
    }

    #[inline]
    pub fn rest(&self) -> &'a str {
        &self.input[self.pos.offset()..]
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.pos.offset() == self.input.len()
    }

    #[inline]
    pub fn save(&self) -> P {
        self.pos.clone()
    }

    #[inline]
    pub fn restore(&mut self, pos: P) {
        self.pos = pos;
    }

    /// Consumes the next `len` bytes, returning them.
    pub fn advance(&mut self, len: usize) -> &'a str {
        let start = self.pos.offset();
        let consumed = &self.input[start..start + len];
        self.pos.advance(consumed);
        consumed
    }

    #[inline]
    pub fn is_reporting(&self) -> bool {
        self.silenced == 0
    }

    /// Stops recording failures until the matching [`State::unsilence`].
    #[inline]
    pub fn silence(&mut self) {
        self.silenced += 1;
    }

    #[inline]
    pub fn unsilence(&mut self) {
        debug_assert!(self.silenced > 0, "Mismatched silence - unsilence pair?");
        self.silenced -= 1;
    }

    /// Records a failure to match `description` at the current position.
    pub fn fail(&mut self, description: &str) {
        if self.is_reporting() {
            let pos = self.pos.clone();
            self.record(pos, description);
        }
    }

    /// Records a failure `len` bytes past the current position.
    pub fn fail_after(&mut self, len: usize, description: &str) {
        if self.is_reporting() {
            let start = self.pos.offset();
            let mut pos = self.pos.clone();
            pos.advance(&self.input[start..start + len]);
            self.record(pos, description);
        }
    }

    fn record(&mut self, pos: P, description: &str) {
        let offset = pos.offset();
        let rightmost = self.failure_pos.offset();

        if offset < rightmost {
            return;
        }
        if offset > rightmost {
            self.failure_pos = pos;
            self.expected.clear();
        }
        self.expected.push(description.to_owned());
    }

    /// Offset of the rightmost failure and what was expected there.
    pub fn rightmost_failure(&self) -> (usize, &[String]) {
        (self.failure_pos.offset(), &self.expected)
    }

    pub fn literal(&mut self, value: &str, description: &str) -> Option<Value> {
        let rest = self.rest();
        if rest.starts_with(value) {
            self.advance(value.len());
            return Some(Value::String(value.to_owned()));
        }

        let matched = rest
            .char_indices()
            .zip(value.chars())
            .find(|&((_, a), b)| a != b)
            .map_or(rest.len(), |((i, _), _)| i);
        self.fail_after(matched, description);
        None
    }

    /// Matches `value` without regard to case, the result is the matched input.
    pub fn literal_ignore_case(&mut self, value: &str, description: &str) -> Option<Value> {
        let rest = self.rest();
        let mut len = 0;
        let mut wanted = value.chars();

        for (i, ch) in rest.char_indices() {
            let Some(expected) = wanted.next() else {
                break;
            };
            if !ch.to_lowercase().eq(expected.to_lowercase()) {
                self.fail_after(i, description);
                return None;
            }
            len = i + ch.len_utf8();
        }

        if wanted.next().is_some() {
            self.fail_after(len, description);
            return None;
        }

        let consumed = self.advance(len);
        Some(Value::String(consumed.to_owned()))
    }

    /// Consumes one character satisfying `predicate`.
    pub fn char_where(
        &mut self,
        predicate: impl Fn(char) -> bool,
        description: &str,
    ) -> Option<char> {
        match self.rest().chars().next() {
            Some(ch) if predicate(ch) => {
                self.advance(ch.len_utf8());
                Some(ch)
            }
            _ => {
                self.fail(description);
                None
            }
        }
    }

    pub fn class(&mut self, class: &CharClass, description: &str) -> Option<Value> {
        self.char_where(|ch| class.matches(ch), description)
            .map(|ch| Value::String(ch.to_string()))
    }

    pub fn any(&mut self) -> Option<Value> {
        self.char_where(|_| true, ANY_CHARACTER)
            .map(|ch| Value::String(ch.to_string()))
    }

    /// Looks up the result of `rule` at the current position. On a hit the
    /// position is moved to where the cached match ended.
    pub fn cached(&mut self, rule: usize) -> Option<Option<Value>> {
        let key = self.cache_key(rule, self.pos.offset());
        let entry = self.cache.as_ref()?.get(&key)?;
        let result = entry.result.clone();
        self.pos = entry.end.clone();
        Some(result)
    }

    /// Stores the result of `rule` started at `start`, ending at the current position.
    pub fn store(&mut self, rule: usize, start: &P, result: &Option<Value>) {
        let key = self.cache_key(rule, start.offset());
        let end = self.pos.clone();
        if let Some(cache) = &mut self.cache {
            cache.insert(
                key,
                CacheEntry {
                    end,
                    result: result.clone(),
                },
            );
        }
    }

    #[inline]
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    fn cache_key(&self, rule: usize, offset: usize) -> CacheKey {
        CacheKey {
            rule,
            offset,
            reporting: self.is_reporting(),
        }
    }

    /// Turns the outcome of the start rule into the final result, failing
    /// unless the whole input was consumed.
    pub fn finish<T>(self, result: Option<T>) -> Result<T, SyntaxError> {
        match result {
            Some(value) if self.at_end() => Ok(value),
            _ => Err(self.error()),
        }
    }

    /// Builds the error describing the furthest point reached.
    pub fn error(self) -> SyntaxError {
        let State {
            input,
            pos,
            failure_pos,
            expected,
            ..
        } = self;

        let (at, expected) = if pos.offset() > failure_pos.offset() {
            // the match stopped past every failure, only the end of input would have been accepted
            (pos, Vec::new())
        } else {
            (failure_pos, expected)
        };

        let offset = at.offset();
        let found = input[offset..].chars().next().map(String::from);
        let (line, column) = match at.line_column() {
            Some(line_column) => line_column,
            None => {
                let pos = LineColumn::at(input, offset);
                (pos.line, pos.column)
            }
        };

        SyntaxError::new(expected, found, offset, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rightmost_failure() {
        let mut s = State::<Offset>::new("abx");
        assert!(s.literal("abc", "\"abc\"").is_none());
        assert!(s.literal("abd", "\"abd\"").is_none());
        assert!(s.literal("x", "\"x\"").is_none());
        assert_eq!(s.offset(), 0);

        let e = s.finish::<Value>(None).unwrap_err();
        assert_eq!(e.offset, 2);
        assert_eq!(e.expected, ["\"abc\"", "\"abd\""]);
        assert_eq!(e.found.as_deref(), Some("x"));
        assert_eq!((e.line, e.column), (1, 3));
    }

    #[test]
    fn test_silenced_failures() {
        let mut s = State::<Offset>::new("b");
        s.silence();
        assert!(s.literal("a", "\"a\"").is_none());
        s.unsilence();
        s.fail("thing");

        let e = s.error();
        assert_eq!(e.expected, ["thing"]);
        assert_eq!(e.message, "Expected thing but \"b\" found.");
    }

    #[test]
    fn test_literals() {
        let mut s = State::<Offset>::new("HeLLo world");
        assert_eq!(s.literal_ignore_case("hello", "\"hello\"i"), Some(Value::from("HeLLo")));
        assert_eq!(s.literal(" ", "\" \""), Some(Value::from(" ")));
        assert_eq!(s.literal("", "\"\""), Some(Value::from("")));
        assert!(s.literal_ignore_case("worlds", "\"worlds\"i").is_none());
        assert_eq!(s.offset(), 6);

        // the failure is recorded after the matching prefix
        assert_eq!(s.rightmost_failure(), (11, &["\"worlds\"i".to_owned()][..]));
    }

    #[test]
    fn test_partial_match_is_error() {
        let mut s = State::<LineColumn>::new("a\nb");
        let a = s.literal("a\n", "\"a\\n\"");
        let e = s.finish(a).unwrap_err();
        assert_eq!(e.offset, 2);
        assert!(e.expected.is_empty());
        assert_eq!((e.line, e.column), (2, 1));
        assert_eq!(e.message, "Expected end of input but \"b\" found.");
    }

    #[test]
    fn test_cache() {
        let mut s = State::<Offset>::with_cache("aaa");
        let start = s.save();
        let result = s.literal("aa", "\"aa\"");
        s.store(0, &start, &result);

        s.restore(start);
        assert_eq!(s.cached(0), Some(Some(Value::from("aa"))));
        assert_eq!(s.offset(), 2);

        // results computed while silenced are kept apart
        s.restore(Offset(0));
        s.silence();
        assert_eq!(s.cached(0), None);
        s.unsilence();

        assert_eq!(s.cached(1), None);
    }
}
