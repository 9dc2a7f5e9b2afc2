use std::{error, fmt};

use pegleg_runtime::SyntaxError;

use crate::StrSpan;

/// The grammar cannot be turned into a parser.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// The grammar text itself is malformed.
    Syntax(SyntaxError),
    /// A character class range whose start is greater than its end, such as `[z-a]`.
    InvalidCharacterRange { range: String, span: StrSpan },
    UndefinedRule { name: String, span: StrSpan },
    LeftRecursion { name: String, span: StrSpan },
}

impl GrammarError {
    /// Location in the grammar text, for errors that are not syntax errors.
    pub fn span(&self) -> Option<StrSpan> {
        match self {
            GrammarError::Syntax(_) => None,
            GrammarError::InvalidCharacterRange { span, .. }
            | GrammarError::UndefinedRule { span, .. }
            | GrammarError::LeftRecursion { span, .. } => Some(*span),
        }
    }

    /// Byte offset of the error in the grammar text.
    pub fn offset(&self) -> usize {
        match self {
            GrammarError::Syntax(e) => e.offset,
            _ => self.span().map_or(0, |span| span.start as usize),
        }
    }
}

impl error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            GrammarError::Syntax(e) => Some(e),
            _ => None,
        }
    }
}
impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Syntax(e) => {
                write!(f, "Line {}, column {}: {}", e.line, e.column, e.message)
            }
            GrammarError::InvalidCharacterRange { range, .. } => {
                write!(f, "Invalid character range: {range}.")
            }
            GrammarError::UndefinedRule { name, .. } => {
                write!(f, "Referenced rule \"{name}\" does not exist.")
            }
            GrammarError::LeftRecursion { name, .. } => {
                write!(f, "Left recursion detected for rule \"{name}\".")
            }
        }
    }
}
impl From<SyntaxError> for GrammarError {
    fn from(value: SyntaxError) -> Self {
        GrammarError::Syntax(value)
    }
}
