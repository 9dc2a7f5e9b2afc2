use std::collections::HashMap;

use cranelift_entity::{entity_impl, EntityRef, PrimaryMap};
use pegleg::ast::{self, Expr, ExprKind, Grammar};
use pegleg_runtime::{quote, ClassPart};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleId(u32);
entity_impl! { RuleId }

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CodeId(u32);
entity_impl! { CodeId }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CodeKind {
    Action,
    Predicate,
}

/// A piece of user code together with the labels it can see.
#[derive(Clone, Debug)]
pub struct CodeSite {
    pub kind: CodeKind,
    pub code: String,
    pub params: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RuleProgram {
    pub name: String,
    pub register_count: usize,
    pub body: Op,
}

/// An allocated expression with references resolved, ready to be run or emitted.
#[derive(Clone, Debug)]
pub struct Op {
    /// Slot receiving the outcome.
    pub result: usize,
    pub kind: OpKind,
}

#[derive(Clone, Debug)]
pub enum OpKind {
    Named {
        description: String,
        body: Box<Op>,
    },
    Choice(Vec<Op>),
    Action {
        pos: usize,
        body: Box<Op>,
        code: CodeId,
        /// Slots of the visible labels, in the order of the code site's params.
        params: Vec<usize>,
    },
    Sequence {
        pos: usize,
        elements: Vec<Op>,
    },
    SimpleAnd {
        pos: usize,
        body: Box<Op>,
    },
    SimpleNot {
        pos: usize,
        body: Box<Op>,
    },
    SemanticAnd {
        code: CodeId,
        params: Vec<usize>,
    },
    SemanticNot {
        code: CodeId,
        params: Vec<usize>,
    },
    Optional(Box<Op>),
    ZeroOrMore(Box<Op>),
    OneOrMore(Box<Op>),
    Call(RuleId),
    Literal {
        value: String,
        ignore_case: bool,
        description: String,
    },
    Class {
        parts: Vec<ClassPart>,
        inverted: bool,
        ignore_case: bool,
        description: String,
    },
    Any,
}

#[derive(Clone, Debug)]
pub struct Program {
    pub initializer: Option<String>,
    pub rules: PrimaryMap<RuleId, RuleProgram>,
    pub start: RuleId,
    pub code: PrimaryMap<CodeId, CodeSite>,
}

impl Program {
    /// Lowers a checked and allocated grammar.
    pub fn lower(grammar: &Grammar) -> Program {
        let mut ids = HashMap::new();
        for (i, rule) in grammar.rules.iter().enumerate() {
            ids.entry(rule.name.as_str()).or_insert(RuleId::from_u32(i as u32));
        }

        let mut cx = LowerCx {
            ids: &ids,
            code: PrimaryMap::new(),
        };
        let mut rules = PrimaryMap::new();
        for rule in &grammar.rules {
            let body = cx.lower(&rule.expression);
            rules.push(RuleProgram {
                name: rule.name.clone(),
                register_count: rule.register_count,
                body,
            });
        }

        let start = ids[grammar.start_rule.as_str()];
        Program {
            initializer: grammar.initializer.as_ref().map(|i| i.code.clone()),
            rules,
            start,
            code: cx.code,
        }
    }

    /// Finds the first rule called `name`.
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rules
            .iter()
            .find(|(_, rule)| rule.name == name)
            .map(|(id, _)| id)
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.values().map(|rule| rule.name.as_str())
    }
}

struct LowerCx<'a> {
    ids: &'a HashMap<&'a str, RuleId>,
    code: PrimaryMap<CodeId, CodeSite>,
}

impl LowerCx<'_> {
    fn lower(&mut self, expr: &Expr) -> Op {
        let result = slot(expr.result);
        let kind = match &expr.kind {
            ExprKind::Named { name, expression } => OpKind::Named {
                description: name.clone(),
                body: self.boxed(expression),
            },
            ExprKind::Choice(alternatives) => {
                OpKind::Choice(alternatives.iter().map(|a| self.lower(a)).collect())
            }
            ExprKind::Action {
                expression,
                code,
                params,
            } => {
                let body = self.boxed(expression);
                let (code, params) = self.code_site(CodeKind::Action, code, params);
                OpKind::Action {
                    pos: slot(expr.pos),
                    body,
                    code,
                    params,
                }
            }
            ExprKind::Sequence(elements) => OpKind::Sequence {
                pos: slot(expr.pos),
                elements: elements.iter().map(|e| self.lower(e)).collect(),
            },
            // labels only matter to the allocator
            ExprKind::Labeled { expression, .. } => return self.lower(expression),
            ExprKind::SimpleAnd(expression) => OpKind::SimpleAnd {
                pos: slot(expr.pos),
                body: self.boxed(expression),
            },
            ExprKind::SimpleNot(expression) => OpKind::SimpleNot {
                pos: slot(expr.pos),
                body: self.boxed(expression),
            },
            ExprKind::SemanticAnd { code, params } => {
                let (code, params) = self.code_site(CodeKind::Predicate, code, params);
                OpKind::SemanticAnd { code, params }
            }
            ExprKind::SemanticNot { code, params } => {
                let (code, params) = self.code_site(CodeKind::Predicate, code, params);
                OpKind::SemanticNot { code, params }
            }
            ExprKind::Optional(expression) => OpKind::Optional(self.boxed(expression)),
            ExprKind::ZeroOrMore(expression) => OpKind::ZeroOrMore(self.boxed(expression)),
            ExprKind::OneOrMore(expression) => OpKind::OneOrMore(self.boxed(expression)),
            ExprKind::RuleRef(name) => {
                let id = self
                    .ids
                    .get(name.as_str())
                    .unwrap_or_else(|| panic!("Unchecked reference to rule {name:?}"));
                OpKind::Call(*id)
            }
            ExprKind::Literal { value, ignore_case } => OpKind::Literal {
                value: value.clone(),
                ignore_case: *ignore_case,
                description: quote(value),
            },
            ExprKind::Class(ast::CharClass {
                parts,
                raw_text,
                inverted,
                ignore_case,
            }) => OpKind::Class {
                parts: parts.clone(),
                inverted: *inverted,
                ignore_case: *ignore_case,
                description: raw_text.clone(),
            },
            ExprKind::Any => OpKind::Any,
        };
        Op { result, kind }
    }

    fn boxed(&mut self, expr: &Expr) -> Box<Op> {
        Box::new(self.lower(expr))
    }

    fn code_site(
        &mut self,
        kind: CodeKind,
        code: &str,
        params: &ast::Params,
    ) -> (CodeId, Vec<usize>) {
        let id = self.code.push(CodeSite {
            kind,
            code: code.to_owned(),
            params: params.iter().map(|(name, _)| name.clone()).collect(),
        });
        (id, params.iter().map(|(_, s)| s.index()).collect())
    }
}

fn slot(slot: Option<ast::Slot>) -> usize {
    slot.expect("Expression was not allocated").index()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowered(src: &str) -> Program {
        let mut grammar = pegleg::parse(src).unwrap();
        crate::alloc::allocate(&mut grammar);
        Program::lower(&grammar)
    }

    #[test]
    fn test_lower() {
        let program = lowered("start = x:'a' b { code } / c; b = [0-9]i; c = 'c'i");
        assert_eq!(program.rules.len(), 3);
        assert_eq!(program.start, RuleId::from_u32(0));
        assert_eq!(program.rule_id("c"), Some(RuleId::from_u32(2)));
        assert_eq!(program.rule_names().collect::<Vec<_>>(), ["start", "b", "c"]);

        let site = &program.code[CodeId::from_u32(0)];
        assert_eq!(site.kind, CodeKind::Action);
        assert_eq!(site.code.trim(), "code");
        assert_eq!(site.params, ["x"]);

        let OpKind::Class { description, .. } = &program.rules[RuleId::from_u32(1)].body.kind else {
            panic!("expected class");
        };
        assert_eq!(description, "[0-9]i");

        let OpKind::Literal { description, .. } = &program.rules[RuleId::from_u32(2)].body.kind else {
            panic!("expected literal");
        };
        assert_eq!(description, "\"c\"");
    }

    #[test]
    fn test_duplicate_rule_first_wins() {
        let program = lowered("start = a; a = 'x'; a = 'y'");
        let OpKind::Call(id) = program.rules[RuleId::from_u32(0)].body.kind else {
            panic!("expected call");
        };
        assert_eq!(id, RuleId::from_u32(1));
    }
}
