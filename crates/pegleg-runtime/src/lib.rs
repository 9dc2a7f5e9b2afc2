//! Support code shared by generated parsers and the in-process matcher.
//!
//! Every matcher function threads a single [`State`] which owns the input
//! position, the rightmost failure tracker, the failure suppression counter
//! and the optional memoization cache. Nothing here is global, so independent
//! parses may run on different threads.

pub mod class;
pub mod error;
pub mod position;
pub mod quote;
pub mod registers;
pub mod state;

pub use class::{CharClass, ClassPart};
pub use error::{ActionError, ParseError, SyntaxError};
pub use position::{LineColumn, Offset, Position};
pub use quote::{quote, quote_class_char};
pub use registers::{Register, Registers};
pub use state::State;

pub use serde_json::Value;

/// Failure description of the `.` expression.
pub const ANY_CHARACTER: &str = "any character";

/// The value produced by zero-width matches and missing optionals.
#[inline]
pub fn empty() -> Value {
    Value::String(String::new())
}
