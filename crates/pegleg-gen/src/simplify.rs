use pegleg::ast::{Expr, ExprKind, Grammar};

/// Removes rules whose whole body is a reference to another rule, pointing
/// their users at the target instead. Returns the number of removed rules.
///
/// Proxies are resolved in declaration order, so a chain of them collapses
/// onto its final target one hop at a time.
pub fn remove_proxy_rules(grammar: &mut Grammar) -> usize {
    let mut removed = Vec::new();

    for i in 0..grammar.rules.len() {
        let rule = &grammar.rules[i];
        let ExprKind::RuleRef(target) = &rule.expression.kind else {
            continue;
        };

        let from = rule.name.clone();
        let to = target.clone();
        log::trace!("inlining proxy rule {from} -> {to}");

        for rule in &mut grammar.rules {
            replace_rule_refs(&mut rule.expression, &from, &to);
        }
        if grammar.start_rule == from {
            grammar.start_rule = to;
        }
        removed.push(i);
    }

    for &i in removed.iter().rev() {
        grammar.rules.remove(i);
    }
    removed.len()
}

fn replace_rule_refs(expr: &mut Expr, from: &str, to: &str) {
    match &mut expr.kind {
        ExprKind::Choice(exprs) | ExprKind::Sequence(exprs) => {
            for expr in exprs {
                replace_rule_refs(expr, from, to);
            }
        }
        ExprKind::Named { expression, .. }
        | ExprKind::Action { expression, .. }
        | ExprKind::Labeled { expression, .. }
        | ExprKind::SimpleAnd(expression)
        | ExprKind::SimpleNot(expression)
        | ExprKind::Optional(expression)
        | ExprKind::ZeroOrMore(expression)
        | ExprKind::OneOrMore(expression) => replace_rule_refs(expression, from, to),
        ExprKind::RuleRef(name) => {
            if name == from {
                *name = to.to_owned();
            }
        }
        ExprKind::SemanticAnd { .. }
        | ExprKind::SemanticNot { .. }
        | ExprKind::Literal { .. }
        | ExprKind::Class(_)
        | ExprKind::Any => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(grammar: &Grammar) -> Vec<&str> {
        grammar.rules.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_proxy_chain() {
        let mut grammar = pegleg::parse("start = a; a = b; b = c 'x'; c = 'c'").unwrap();
        assert_eq!(remove_proxy_rules(&mut grammar), 2);

        assert_eq!(names(&grammar), ["b", "c"]);
        assert_eq!(grammar.start_rule, "b");
    }

    #[test]
    fn test_proxy_declared_after_user() {
        let mut grammar = pegleg::parse("start = 'x' a*; b = c; a = b; c = 'c'").unwrap();
        remove_proxy_rules(&mut grammar);

        assert_eq!(names(&grammar), ["start", "c"]);
        assert_eq!(grammar.start_rule, "start");

        let ExprKind::Sequence(elements) = &grammar.rules[0].expression.kind else {
            panic!("expected sequence");
        };
        let ExprKind::ZeroOrMore(repeated) = &elements[1].kind else {
            panic!("expected repetition");
        };
        assert!(matches!(&repeated.kind, ExprKind::RuleRef(name) if name == "c"));
    }

    #[test]
    fn test_named_rule_is_not_proxy() {
        let mut grammar = pegleg::parse("start \"thing\" = a; a = 'a'").unwrap();
        assert_eq!(remove_proxy_rules(&mut grammar), 0);
        assert_eq!(names(&grammar), ["start", "a"]);
    }
}
