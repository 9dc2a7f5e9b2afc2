use std::{error, fmt};

use pegleg::GrammarError;

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    Grammar(GrammarError),
    /// An action block has no registered implementation.
    MissingAction { code: String },
    /// A semantic predicate block has no registered implementation.
    MissingPredicate { code: String },
}

impl error::Error for BuildError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            BuildError::Grammar(e) => Some(e),
            _ => None,
        }
    }
}
impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Grammar(e) => fmt::Display::fmt(e, f),
            BuildError::MissingAction { code } => {
                write!(f, "No implementation for action {{{code}}}.")
            }
            BuildError::MissingPredicate { code } => {
                write!(f, "No implementation for predicate {{{code}}}.")
            }
        }
    }
}
impl From<GrammarError> for BuildError {
    fn from(value: GrammarError) -> Self {
        BuildError::Grammar(value)
    }
}
