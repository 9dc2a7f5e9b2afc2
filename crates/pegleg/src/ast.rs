use cranelift_entity::entity_impl;
use pegleg_runtime::ClassPart;

use crate::StrSpan;

/// Local storage slot of a generated rule function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u32);
entity_impl!(Slot, "r");

/// Labels visible to a piece of user code, in order of visibility.
pub type Params = Vec<(String, Slot)>;

#[derive(Clone, Debug)]
pub struct Code {
    pub span: StrSpan,
    /// Text between the outer braces.
    pub code: String,
}

#[derive(Clone, Debug)]
pub struct Grammar {
    pub initializer: Option<Code>,
    pub rules: Vec<Rule>,
    pub start_rule: String,
}

impl Grammar {
    /// Finds the first rule called `name`, later duplicates are never reached.
    pub fn find_rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn find_rule_index(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub span: StrSpan,
    pub name: String,
    pub expression: Expr,
    /// Number of slots the rule function needs, set by the allocator.
    pub register_count: usize,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub span: StrSpan,
    pub kind: ExprKind,
    /// Slot receiving the outcome of the match.
    pub result: Option<Slot>,
    /// Slot holding the position to backtrack to.
    pub pos: Option<Slot>,
}

#[derive(Clone, Debug)]
pub struct CharClass {
    pub parts: Vec<ClassPart>,
    /// Normalized source form such as `[^a-z]i`, also the failure description.
    pub raw_text: String,
    pub inverted: bool,
    pub ignore_case: bool,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    /// Reports a single failure under `name` instead of the body's failures.
    Named {
        name: String,
        expression: Box<Expr>,
    },
    Choice(Vec<Expr>),
    Action {
        expression: Box<Expr>,
        code: String,
        params: Params,
    },
    Sequence(Vec<Expr>),
    Labeled {
        label: String,
        expression: Box<Expr>,
    },
    SimpleAnd(Box<Expr>),
    SimpleNot(Box<Expr>),
    SemanticAnd {
        code: String,
        params: Params,
    },
    SemanticNot {
        code: String,
        params: Params,
    },
    Optional(Box<Expr>),
    ZeroOrMore(Box<Expr>),
    OneOrMore(Box<Expr>),
    RuleRef(String),
    Literal {
        value: String,
        ignore_case: bool,
    },
    Class(CharClass),
    Any,
}

impl Expr {
    pub fn new(span: StrSpan, kind: ExprKind) -> Expr {
        Expr {
            span,
            kind,
            result: None,
            pos: None,
        }
    }

    pub fn rule_ref(span: StrSpan, name: impl Into<String>) -> Expr {
        Expr::new(span, ExprKind::RuleRef(name.into()))
    }

    pub fn literal(span: StrSpan, value: impl Into<String>, ignore_case: bool) -> Expr {
        let value = value.into();
        Expr::new(span, ExprKind::Literal { value, ignore_case })
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Named { .. } => "named",
            ExprKind::Choice(_) => "choice",
            ExprKind::Action { .. } => "action",
            ExprKind::Sequence(_) => "sequence",
            ExprKind::Labeled { .. } => "labeled",
            ExprKind::SimpleAnd(_) => "simple_and",
            ExprKind::SimpleNot(_) => "simple_not",
            ExprKind::SemanticAnd { .. } => "semantic_and",
            ExprKind::SemanticNot { .. } => "semantic_not",
            ExprKind::Optional(_) => "optional",
            ExprKind::ZeroOrMore(_) => "zero_or_more",
            ExprKind::OneOrMore(_) => "one_or_more",
            ExprKind::RuleRef(_) => "rule_ref",
            ExprKind::Literal { .. } => "literal",
            ExprKind::Class(_) => "class",
            ExprKind::Any => "any",
        }
    }

    #[allow(unused_must_use)]
    pub fn display_with_indent(&self, buf: &mut dyn std::fmt::Write, indent: u32) {
        for _ in 0..indent {
            write!(buf, "  ");
        }
        write!(buf, "{}", self.kind_name());
        match &self.kind {
            ExprKind::Named { name, .. } => write!(buf, " {name:?}"),
            ExprKind::Action { code, params, .. }
            | ExprKind::SemanticAnd { code, params }
            | ExprKind::SemanticNot { code, params } => {
                write!(buf, " {{{code}}}");
                display_params(buf, params)
            }
            ExprKind::Labeled { label, .. } => write!(buf, " {label}"),
            ExprKind::RuleRef(name) => write!(buf, " {name}"),
            ExprKind::Literal { value, ignore_case } => {
                let flags = if *ignore_case { "i" } else { "" };
                write!(buf, " {value:?}{flags}")
            }
            ExprKind::Class(class) => write!(buf, " {}", class.raw_text),
            _ => Ok(()),
        };
        if let Some(result) = self.result {
            write!(buf, " -> {result}");
        }
        if let Some(pos) = self.pos {
            write!(buf, " @{pos}");
        }
        writeln!(buf);

        match &self.kind {
            ExprKind::Choice(exprs) | ExprKind::Sequence(exprs) => {
                for expr in exprs {
                    expr.display_with_indent(buf, indent + 1);
                }
            }
            ExprKind::Named { expression, .. }
            | ExprKind::Action { expression, .. }
            | ExprKind::Labeled { expression, .. }
            | ExprKind::SimpleAnd(expression)
            | ExprKind::SimpleNot(expression)
            | ExprKind::Optional(expression)
            | ExprKind::ZeroOrMore(expression)
            | ExprKind::OneOrMore(expression) => expression.display_with_indent(buf, indent + 1),
            ExprKind::SemanticAnd { .. }
            | ExprKind::SemanticNot { .. }
            | ExprKind::RuleRef(_)
            | ExprKind::Literal { .. }
            | ExprKind::Class(_)
            | ExprKind::Any => {}
        }
    }
}

fn display_params(buf: &mut dyn std::fmt::Write, params: &Params) -> std::fmt::Result {
    if params.is_empty() {
        return Ok(());
    }
    write!(buf, " (")?;
    for (i, (name, slot)) in params.iter().enumerate() {
        if i > 0 {
            write!(buf, ", ")?;
        }
        write!(buf, "{name}: {slot}")?;
    }
    write!(buf, ")")
}

impl Grammar {
    #[allow(unused_must_use)]
    pub fn display(&self, buf: &mut dyn std::fmt::Write) {
        if let Some(initializer) = &self.initializer {
            writeln!(buf, "initializer {{{}}}", initializer.code);
        }
        writeln!(buf, "start {}", self.start_rule);
        for rule in &self.rules {
            writeln!(buf, "\nrule {} ({} registers):", rule.name, rule.register_count);
            rule.expression.display_with_indent(buf, 1);
        }
    }
}
