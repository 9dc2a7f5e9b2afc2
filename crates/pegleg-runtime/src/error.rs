use std::{error, fmt};

use crate::quote;

/// The input does not match the grammar.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SyntaxError {
    /// Sorted and de-duplicated descriptions of what was expected.
    pub expected: Vec<String>,
    /// The character found at `offset`, `None` at the end of input.
    pub found: Option<String>,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(
        mut expected: Vec<String>,
        found: Option<String>,
        offset: usize,
        line: usize,
        column: usize,
    ) -> SyntaxError {
        expected.sort();
        expected.dedup();

        let message = build_message(&expected, found.as_deref());
        SyntaxError {
            expected,
            found,
            offset,
            line,
            column,
            message,
        }
    }
}

fn build_message(expected: &[String], found: Option<&str>) -> String {
    let expected = match expected {
        [] => "end of input".to_owned(),
        [single] => single.clone(),
        [init @ .., last] => format!("{} or {last}", init.join(", ")),
    };
    let found = match found {
        Some(found) => quote(found),
        None => "end of input".to_owned(),
    };
    format!("Expected {expected} but {found} found.")
}

impl error::Error for SyntaxError {}
impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.message, f)
    }
}

/// Error raised by user action or predicate code, aborts the whole parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(message: impl ToString) -> ActionError {
        ActionError(message.to_string())
    }
}

impl error::Error for ActionError {}
impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Syntax(SyntaxError),
    /// The requested start rule does not exist.
    InvalidStartRule(String),
    Action(ActionError),
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ParseError::Syntax(e) => Some(e),
            ParseError::InvalidStartRule(_) => None,
            ParseError::Action(e) => Some(e),
        }
    }
}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax(e) => fmt::Display::fmt(e, f),
            ParseError::InvalidStartRule(name) => {
                write!(f, "Invalid rule name: {}.", quote(name))
            }
            ParseError::Action(e) => write!(f, "Action failed: {e}"),
        }
    }
}
impl From<SyntaxError> for ParseError {
    fn from(value: SyntaxError) -> Self {
        ParseError::Syntax(value)
    }
}
impl From<ActionError> for ParseError {
    fn from(value: ActionError) -> Self {
        ParseError::Action(value)
    }
}

#[test]
fn test_message() {
    let e = SyntaxError::new(vec![], Some("x".into()), 0, 1, 1);
    assert_eq!(e.message, "Expected end of input but \"x\" found.");

    let e = SyntaxError::new(vec!["\"a\"".into()], None, 0, 1, 1);
    assert_eq!(e.message, "Expected \"a\" but end of input found.");

    let e = SyntaxError::new(
        vec!["\"c\"".into(), "\"a\"".into(), "\"b\"".into(), "\"a\"".into()],
        Some("\n".into()),
        0,
        1,
        1,
    );
    assert_eq!(e.expected, ["\"a\"", "\"b\"", "\"c\""]);
    assert_eq!(e.message, "Expected \"a\", \"b\" or \"c\" but \"\\n\" found.");
    assert_eq!(e.to_string(), e.message);
}
