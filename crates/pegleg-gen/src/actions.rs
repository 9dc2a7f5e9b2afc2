use std::{collections::HashMap, fmt, sync::Arc};

use pegleg_runtime::{ActionError, Value};

pub type ActionFn = dyn Fn(&Context<'_>) -> Result<Value, ActionError> + Send + Sync;
pub type PredicateFn = dyn Fn(&Context<'_>) -> Result<bool, ActionError> + Send + Sync;

/// What user code gets to see when it runs.
pub struct Context<'a> {
    pub(crate) input: &'a str,
    pub(crate) offset: usize,
    pub(crate) end: usize,
    pub(crate) line_column: Option<(usize, usize)>,
    pub(crate) matched: &'a Value,
    pub(crate) labels: Vec<(&'a str, &'a Value)>,
}

impl<'a> Context<'a> {
    /// Byte offset where the action's expression started, or the current
    /// offset for predicates.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Line and column of [`Context::offset`], only when they are tracked.
    pub fn line_column(&self) -> Option<(usize, usize)> {
        self.line_column
    }

    /// Value of a visible label, `null` if the labeled expression did not match.
    pub fn label(&self, name: &str) -> Option<&'a Value> {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| *value)
    }

    /// Visible labels, outer ones first.
    pub fn labels(&self) -> &[(&'a str, &'a Value)] {
        &self.labels
    }

    /// Result of the expression wrapped by an action, `null` for predicates.
    pub fn matched(&self) -> &'a Value {
        self.matched
    }

    /// Input text consumed by the action's expression.
    pub fn text(&self) -> &'a str {
        &self.input[self.offset..self.end]
    }
}

/// Host implementations of the code blocks of a grammar.
///
/// Code blocks are looked up by their text with surrounding whitespace
/// removed, so `{ return x; }` is registered as `"return x;"`.
#[derive(Clone, Default)]
pub struct Actions {
    actions: HashMap<String, Arc<ActionFn>>,
    predicates: HashMap<String, Arc<PredicateFn>>,
    action_fallback: Option<Arc<ActionFn>>,
    predicate_fallback: Option<Arc<PredicateFn>>,
}

impl Actions {
    pub fn new() -> Actions {
        Actions::default()
    }

    /// Runs every action as the identity on its matched value and accepts
    /// every predicate. Registered code still takes precedence.
    pub fn passthrough() -> Actions {
        Actions::new()
            .fallback_action(|cx| Ok(cx.matched().clone()))
            .fallback_predicate(|_| Ok(true))
    }

    pub fn action(
        mut self,
        code: &str,
        f: impl Fn(&Context<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    ) -> Actions {
        self.actions.insert(code.trim().to_owned(), Arc::new(f));
        self
    }

    pub fn predicate(
        mut self,
        code: &str,
        f: impl Fn(&Context<'_>) -> Result<bool, ActionError> + Send + Sync + 'static,
    ) -> Actions {
        self.predicates.insert(code.trim().to_owned(), Arc::new(f));
        self
    }

    /// Handles actions whose code has no registered implementation.
    pub fn fallback_action(
        mut self,
        f: impl Fn(&Context<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    ) -> Actions {
        self.action_fallback = Some(Arc::new(f));
        self
    }

    pub fn fallback_predicate(
        mut self,
        f: impl Fn(&Context<'_>) -> Result<bool, ActionError> + Send + Sync + 'static,
    ) -> Actions {
        self.predicate_fallback = Some(Arc::new(f));
        self
    }

    pub(crate) fn find_action(&self, code: &str) -> Option<Arc<ActionFn>> {
        self.actions
            .get(code.trim())
            .or(self.action_fallback.as_ref())
            .cloned()
    }

    pub(crate) fn find_predicate(&self, code: &str) -> Option<Arc<PredicateFn>> {
        self.predicates
            .get(code.trim())
            .or(self.predicate_fallback.as_ref())
            .cloned()
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[test]
fn test_lookup() {
    let actions = Actions::new()
        .action(" return 1; ", |_| Ok(Value::from(1)))
        .predicate("ok", |_| Ok(false));

    assert!(actions.find_action("\n  return 1;\n").is_some());
    assert!(actions.find_action("return 2;").is_none());
    assert!(actions.find_predicate("ok").is_some());
    assert!(actions.find_predicate("return 1;").is_none());

    let passthrough = Actions::passthrough();
    assert!(passthrough.find_action("anything").is_some());
    assert!(passthrough.find_predicate("anything").is_some());
}
