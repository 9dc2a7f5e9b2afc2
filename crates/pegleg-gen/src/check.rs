use std::collections::HashMap;

use pegleg::{
    ast::{Expr, ExprKind, Grammar, Rule},
    GrammarError,
};

/// Name lookup returning the first rule of a given name.
fn rule_table(grammar: &Grammar) -> HashMap<&str, &Rule> {
    let mut table = HashMap::new();
    for rule in &grammar.rules {
        table.entry(rule.name.as_str()).or_insert(rule);
    }
    table
}

/// Fails on the first reference to a rule that is not defined anywhere.
pub fn check_missing_rules(grammar: &Grammar) -> Result<(), GrammarError> {
    let table = rule_table(grammar);
    for rule in &grammar.rules {
        check_references(&rule.expression, &table)?;
    }
    Ok(())
}

fn check_references(expr: &Expr, table: &HashMap<&str, &Rule>) -> Result<(), GrammarError> {
    match &expr.kind {
        ExprKind::Choice(exprs) | ExprKind::Sequence(exprs) => {
            for expr in exprs {
                check_references(expr, table)?;
            }
            Ok(())
        }
        ExprKind::Named { expression, .. }
        | ExprKind::Action { expression, .. }
        | ExprKind::Labeled { expression, .. }
        | ExprKind::SimpleAnd(expression)
        | ExprKind::SimpleNot(expression)
        | ExprKind::Optional(expression)
        | ExprKind::ZeroOrMore(expression)
        | ExprKind::OneOrMore(expression) => check_references(expression, table),
        ExprKind::RuleRef(name) => match table.contains_key(name.as_str()) {
            true => Ok(()),
            false => Err(GrammarError::UndefinedRule {
                name: name.clone(),
                span: expr.span,
            }),
        },
        ExprKind::SemanticAnd { .. }
        | ExprKind::SemanticNot { .. }
        | ExprKind::Literal { .. }
        | ExprKind::Class(_)
        | ExprKind::Any => Ok(()),
    }
}

/// Fails when a rule can reach itself before consuming any input.
///
/// Only the leftmost element of a sequence is followed, and semantic
/// predicates end the walk. A sequence that starts with a predicate or with
/// an expression that can match nothing is therefore not inspected further.
pub fn check_left_recursion(grammar: &Grammar) -> Result<(), GrammarError> {
    let table = rule_table(grammar);
    let mut path = Vec::new();
    for rule in &grammar.rules {
        path.push(rule.name.as_str());
        check_leftmost(&rule.expression, &table, &mut path)?;
        path.pop();
    }
    Ok(())
}

fn check_leftmost<'a>(
    expr: &'a Expr,
    table: &HashMap<&str, &'a Rule>,
    path: &mut Vec<&'a str>,
) -> Result<(), GrammarError> {
    match &expr.kind {
        ExprKind::Choice(alternatives) => {
            for alternative in alternatives {
                check_leftmost(alternative, table, path)?;
            }
            Ok(())
        }
        ExprKind::Sequence(elements) => match elements.first() {
            Some(first) => check_leftmost(first, table, path),
            None => Ok(()),
        },
        ExprKind::Named { expression, .. }
        | ExprKind::Action { expression, .. }
        | ExprKind::Labeled { expression, .. }
        | ExprKind::SimpleAnd(expression)
        | ExprKind::SimpleNot(expression)
        | ExprKind::Optional(expression)
        | ExprKind::ZeroOrMore(expression)
        | ExprKind::OneOrMore(expression) => check_leftmost(expression, table, path),
        ExprKind::RuleRef(name) => {
            if path.contains(&name.as_str()) {
                //      /ref
                // A -> B -> C
                // ↑_________|
                return Err(GrammarError::LeftRecursion {
                    name: name.clone(),
                    span: expr.span,
                });
            }
            let Some(&rule) = table.get(name.as_str()) else {
                return Ok(());
            };
            path.push(rule.name.as_str());
            let result = check_leftmost(&rule.expression, table, path);
            path.pop();
            result
        }
        ExprKind::SemanticAnd { .. }
        | ExprKind::SemanticNot { .. }
        | ExprKind::Literal { .. }
        | ExprKind::Class(_)
        | ExprKind::Any => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(src: &str) -> Result<(), GrammarError> {
        let grammar = pegleg::parse(src).unwrap();
        check_missing_rules(&grammar)?;
        check_left_recursion(&grammar)
    }

    #[test]
    fn test_missing_rules() {
        assert!(check("a = b c; b = 'b'; c = b").is_ok());

        let err = check("a = b / c; b = 'b'").unwrap_err();
        assert!(matches!(&err, GrammarError::UndefinedRule { name, .. } if name == "c"));
        assert_eq!(err.to_string(), "Referenced rule \"c\" does not exist.");

        // references hidden behind every kind of node are found
        for body in ["!x", "&x", "x?", "x*", "x+", "l:x", "(x) { code }", "'a' x"] {
            let err = check(&format!("a \"name\" = {body}")).unwrap_err();
            assert!(
                matches!(&err, GrammarError::UndefinedRule { name, .. } if name == "x"),
                "{body}"
            );
        }
    }

    #[test]
    fn test_left_recursion() {
        let direct = check("a = a 'x' / 'y'").unwrap_err();
        assert_eq!(direct.to_string(), "Left recursion detected for rule \"a\".");

        let indirect = check("a = b 'x'; b = c; c = 'z' / a").unwrap_err();
        assert!(matches!(&indirect, GrammarError::LeftRecursion { name, .. } if name == "a"));

        let through_label = check("a = l:(b:a)? 'x'").unwrap_err();
        assert!(matches!(through_label, GrammarError::LeftRecursion { .. }));

        // consuming input before the reference is fine
        assert!(check("a = 'x' a / 'y'").is_ok());
        assert!(check("a = '(' a ')' / b; b = 'b'").is_ok());
    }

    #[test]
    fn test_left_recursion_not_followed() {
        // predicates end the walk and only the first sequence element is followed
        assert!(check("a = &{ p } a").is_ok());
        assert!(check("a = !{ p } 'x' a").is_ok());
        assert!(check("a = 'x'? a").is_ok());
    }
}
