//! Turns grammar text into a runnable [`Matcher`] or into Rust source.
//!
//! Compilation is a fixed pipeline, each pass consuming the output of the
//! previous one and the first failing pass aborting the whole thing:
//! parsing, the missing rule and left recursion checks, proxy rule removal,
//! slot allocation, lowering and emission.

pub mod actions;
pub mod alloc;
pub mod check;
pub mod codegen;
pub mod error;
pub mod matcher;
pub mod program;
pub mod simplify;

use pegleg::{ast::Grammar, GrammarError};
use serde::Deserialize;

pub use actions::{Actions, Context};
pub use error::BuildError;
pub use matcher::Matcher;
pub use program::Program;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Memoize rule results by start position.
    pub cache: bool,
    /// Track line and column numbers and pass them to code blocks.
    pub track_line_and_column: bool,
}

impl Options {
    pub fn from_json(json: &str) -> serde_json::Result<Options> {
        serde_json::from_str(json)
    }
}

/// Output of [`compile`].
#[derive(Clone, Debug)]
pub struct Compiled {
    /// The grammar after simplification and slot allocation.
    pub grammar: Grammar,
    pub program: Program,
    /// Rust source of a parser module depending on `pegleg-runtime`.
    pub source: String,
}

pub fn compile(text: &str, options: &Options) -> Result<Compiled, GrammarError> {
    log::debug!("parsing grammar ({} bytes)", text.len());
    let mut grammar = pegleg::parse(text)?;

    log::debug!("checking {} rules", grammar.rules.len());
    check::check_missing_rules(&grammar)?;
    check::check_left_recursion(&grammar)?;

    let removed = simplify::remove_proxy_rules(&mut grammar);
    log::debug!("removed {removed} proxy rules");

    alloc::allocate(&mut grammar);
    let program = Program::lower(&grammar);

    log::debug!("emitting source with {options:?}");
    let source = codegen::generate(&program, options);

    Ok(Compiled {
        grammar,
        program,
        source,
    })
}

/// Compiles `text` and binds its code blocks to `actions`.
pub fn build_parser(
    text: &str,
    actions: Actions,
    options: Options,
) -> Result<Matcher, BuildError> {
    let compiled = compile(text, &options)?;
    Matcher::new(compiled, &actions, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_json() {
        assert_eq!(Options::from_json("{}").unwrap(), Options::default());
        assert_eq!(
            Options::from_json(r#"{"cache": true, "trackLineAndColumn": true}"#).unwrap(),
            Options {
                cache: true,
                track_line_and_column: true
            }
        );
        assert!(Options::from_json(r#"{"cache": "yes"}"#).is_err());
    }

    #[test]
    fn test_compile_errors() {
        let err = compile("start = ('a'", &Options::default()).unwrap_err();
        assert!(matches!(err, GrammarError::Syntax(_)));

        let err = compile("start = missing", &Options::default()).unwrap_err();
        assert_eq!(err.to_string(), "Referenced rule \"missing\" does not exist.");

        // validation runs before proxies are removed, so user names are reported
        let err = compile("start = a; a = b; b = a 'x'", &Options::default()).unwrap_err();
        assert!(matches!(err, GrammarError::LeftRecursion { .. }));

        let err = build_parser("start = [z-a]", Actions::new(), Options::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Invalid character range: z-a.");
    }

    #[test]
    fn test_compile() {
        let compiled = compile("start = a; a = 'x' b*; b = [0-9]", &Options::default()).unwrap();
        assert_eq!(compiled.grammar.start_rule, "a");
        assert_eq!(compiled.grammar.rules.len(), 2);
        assert_eq!(compiled.grammar.rules[0].register_count, 5);
        assert!(compiled.source.contains("pub fn parse("));
    }
}
