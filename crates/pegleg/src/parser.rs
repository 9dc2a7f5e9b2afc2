use pegleg_runtime::{quote, quote_class_char, ClassPart, Offset, State, ANY_CHARACTER};

use crate::{
    ast::{CharClass, Code, Expr, ExprKind, Grammar, Rule},
    GrammarError, StrSpan,
};

struct Parser<'a> {
    s: State<'a, Offset>,
    // the first invalid class range aborts the parse once the text has been read
    invalid_range: Option<GrammarError>,
}

impl<'a> Parser<'a> {
    #[inline]
    fn offset(&self) -> usize {
        self.s.offset()
    }

    fn span_since(&self, start: usize) -> StrSpan {
        StrSpan::new(start, self.offset())
    }

    fn text_since(&self, start: usize) -> &'a str {
        &self.s.input()[start..self.offset()]
    }

    /// Runs `f`, backtracking to the current position if it fails.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Parser<'a>) -> Option<T>) -> Option<T> {
        let start = self.s.save();
        let result = f(self);
        if result.is_none() {
            self.s.restore(start);
        }
        result
    }

    /// Runs `f` with its own failures silenced, reporting `name` instead.
    fn named<T>(&mut self, name: &str, f: impl FnOnce(&mut Parser<'a>) -> Option<T>) -> Option<T> {
        self.s.silence();
        let result = self.attempt(f);
        self.s.unsilence();
        if result.is_none() {
            self.s.fail(name);
        }
        result
    }

    /// Runs `f` without consuming input or reporting failures.
    fn lookahead(&mut self, f: impl FnOnce(&mut Parser<'a>) -> bool) -> bool {
        let start = self.s.save();
        self.s.silence();
        let matched = f(self);
        self.s.unsilence();
        self.s.restore(start);
        matched
    }

    fn literal(&mut self, text: &str) -> bool {
        self.s.literal(text, &quote(text)).is_some()
    }

    /// A literal followed by insignificant whitespace.
    fn token(&mut self, text: &str) -> Option<()> {
        if !self.literal(text) {
            return None;
        }
        skip(self);
        Some(())
    }
}

/// Parses grammar text into its syntax tree.
pub fn parse(src: &str) -> Result<Grammar, GrammarError> {
    let mut p = Parser {
        s: State::new(src),
        invalid_range: None,
    };

    let result = grammar(&mut p);
    if let Some(err) = p.invalid_range.take() {
        return Err(err);
    }

    Ok(p.s.finish(result)?)
}

// __ initializer? rule+
fn grammar(p: &mut Parser) -> Option<Grammar> {
    p.attempt(|p| {
        skip(p);
        let initializer = initializer(p);

        let mut rules = Vec::new();
        while let Some(rule) = rule(p) {
            rules.push(rule);
        }

        let start_rule = rules.first()?.name.clone();
        Some(Grammar {
            initializer,
            rules,
            start_rule,
        })
    })
}

// action ";"?
fn initializer(p: &mut Parser) -> Option<Code> {
    let start = p.offset();
    let code = action(p)?;
    p.token(";");
    Some(Code {
        span: p.span_since(start),
        code,
    })
}

// identifier string? "=" choice ";"?
fn rule(p: &mut Parser) -> Option<Rule> {
    p.attempt(|p| {
        let start = p.offset();
        let name = identifier(p)?;
        let display_name = string(p);
        p.token("=")?;
        let expression = choice(p)?;
        p.token(";");

        let expression = match display_name {
            Some(name) => Expr::new(
                expression.span,
                ExprKind::Named {
                    name,
                    expression: Box::new(expression),
                },
            ),
            None => expression,
        };

        Some(Rule {
            span: p.span_since(start),
            name,
            expression,
            register_count: 0,
        })
    })
}

// sequence ("/" sequence)*
fn choice(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();
    let mut alternatives = vec![sequence(p)?];

    while let Some(next) = p.attempt(|p| {
        p.token("/")?;
        sequence(p)
    }) {
        alternatives.push(next);
    }

    if alternatives.len() == 1 {
        return alternatives.pop();
    }
    Some(Expr::new(p.span_since(start), ExprKind::Choice(alternatives)))
}

// labeled* action / labeled*
fn sequence(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();
    let expression = labeled_list(p, start);

    match action(p) {
        Some(code) => Some(Expr::new(
            p.span_since(start),
            ExprKind::Action {
                expression: Box::new(expression),
                code,
                params: Vec::new(),
            },
        )),
        None => Some(expression),
    }
}

fn labeled_list(p: &mut Parser, start: usize) -> Expr {
    let mut elements = Vec::new();
    while let Some(element) = labeled(p) {
        elements.push(element);
    }

    // a single element stands for itself
    match <[Expr; 1]>::try_from(elements) {
        Ok([single]) => single,
        Err(elements) => Expr::new(p.span_since(start), ExprKind::Sequence(elements)),
    }
}

// identifier ":" prefixed / prefixed
fn labeled(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();

    let labeled = p.attempt(|p| {
        let label = identifier(p)?;
        p.token(":")?;
        let expression = prefixed(p)?;
        Some(Expr::new(
            p.span_since(start),
            ExprKind::Labeled {
                label,
                expression: Box::new(expression),
            },
        ))
    });

    labeled.or_else(|| prefixed(p))
}

// "&" action / "&" suffixed / "!" action / "!" suffixed / suffixed
fn prefixed(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();

    for (operator, negated) in [("&", false), ("!", true)] {
        let semantic = p.attempt(|p| {
            p.token(operator)?;
            action(p)
        });
        if let Some(code) = semantic {
            let params = Vec::new();
            let kind = match negated {
                false => ExprKind::SemanticAnd { code, params },
                true => ExprKind::SemanticNot { code, params },
            };
            return Some(Expr::new(p.span_since(start), kind));
        }

        let simple = p.attempt(|p| {
            p.token(operator)?;
            suffixed(p)
        });
        if let Some(expression) = simple {
            let expression = Box::new(expression);
            let kind = match negated {
                false => ExprKind::SimpleAnd(expression),
                true => ExprKind::SimpleNot(expression),
            };
            return Some(Expr::new(p.span_since(start), kind));
        }
    }

    suffixed(p)
}

// primary "?" / primary "*" / primary "+" / primary
fn suffixed(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();
    let primary = primary(p)?;

    let kind = if p.token("?").is_some() {
        ExprKind::Optional(Box::new(primary))
    } else if p.token("*").is_some() {
        ExprKind::ZeroOrMore(Box::new(primary))
    } else if p.token("+").is_some() {
        ExprKind::OneOrMore(Box::new(primary))
    } else {
        return Some(primary);
    };

    Some(Expr::new(p.span_since(start), kind))
}

// identifier !(string? "=") / literal / class / "." / "(" choice ")"
fn primary(p: &mut Parser) -> Option<Expr> {
    let start = p.offset();

    let rule_ref = p.attempt(|p| {
        let name = identifier(p)?;
        // an identifier followed by `=` starts the next rule
        let is_rule_start = p.lookahead(|p| {
            string(p);
            p.token("=").is_some()
        });
        if is_rule_start {
            return None;
        }
        let span = StrSpan::new(start, start + name.len());
        Some(Expr::rule_ref(span, name))
    });
    if rule_ref.is_some() {
        return rule_ref;
    }

    if let Some((value, ignore_case)) = literal(p) {
        return Some(Expr::literal(p.span_since(start), value, ignore_case));
    }

    if let Some(class) = class(p) {
        return Some(Expr::new(p.span_since(start), ExprKind::Class(class)));
    }

    if p.token(".").is_some() {
        return Some(Expr::new(p.span_since(start), ExprKind::Any));
    }

    p.attempt(|p| {
        p.token("(")?;
        let expression = choice(p)?;
        p.token(")")?;
        Some(expression)
    })
}

// "action" = braced __
fn action(p: &mut Parser) -> Option<String> {
    p.named("action", |p| {
        let start = p.offset();
        if !braced(p) {
            return None;
        }
        let braced = p.text_since(start);
        skip(p);
        Some(braced[1..braced.len() - 1].to_owned())
    })
}

// "{" (braced / [^{}]+)* "}"
fn braced(p: &mut Parser) -> bool {
    p.attempt(|p| {
        if !p.literal("{") {
            return None;
        }
        loop {
            if braced(p) {
                continue;
            }
            if p.s.char_where(|c| c != '{' && c != '}', "[^{}]").is_some() {
                continue;
            }
            break;
        }
        p.literal("}").then_some(())
    })
    .is_some()
}

// "identifier" = [a-zA-Z_$] [a-zA-Z0-9_$]* __
fn identifier(p: &mut Parser) -> Option<String> {
    p.named("identifier", |p| {
        let start = p.offset();
        let head = |c: char| c.is_ascii_alphabetic() || c == '_' || c == '$';
        let tail = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';

        p.s.char_where(head, "[a-zA-Z_$]")?;
        while p.s.char_where(tail, "[a-zA-Z0-9_$]").is_some() {}

        let name = p.text_since(start).to_owned();
        skip(p);
        Some(name)
    })
}

// "literal" = (doubleQuotedString / singleQuotedString) "i"? __
fn literal(p: &mut Parser) -> Option<(String, bool)> {
    p.named("literal", |p| {
        let value = quoted_string(p)?;
        let ignore_case = p.literal("i");
        skip(p);
        Some((value, ignore_case))
    })
}

// "string" = (doubleQuotedString / singleQuotedString) __
fn string(p: &mut Parser) -> Option<String> {
    p.named("string", |p| {
        let value = quoted_string(p)?;
        skip(p);
        Some(value)
    })
}

// '"' doubleQuotedCharacter* '"' / "'" singleQuotedCharacter* "'"
fn quoted_string(p: &mut Parser) -> Option<String> {
    for (delimiter, description) in [('"', "\"\\\"\""), ('\'', "\"'\"")] {
        let string = p.attempt(|p| {
            p.s.char_where(|c| c == delimiter, description)?;
            let mut value = String::new();
            while string_character(p, delimiter, &mut value) {}
            p.s.char_where(|c| c == delimiter, description)?;
            Some(value)
        });
        if string.is_some() {
            return string;
        }
    }
    None
}

// !(delimiter / "\\" / eolChar) . / escapeSequence
fn string_character(p: &mut Parser, delimiter: char, out: &mut String) -> bool {
    let simple = |c: char| c != delimiter && c != '\\' && !is_eol_char(c);
    if let Some(ch) = p.s.char_where(simple, ANY_CHARACTER) {
        out.push(ch);
        return true;
    }
    escape_sequence(p, out)
}

// simpleEscape / zeroEscape / hexEscape / unicodeEscape / eolEscape
fn escape_sequence(p: &mut Parser, out: &mut String) -> bool {
    // "\\" !(digit / "x" / "u" / eolChar) .
    let simple = p.attempt(|p| {
        p.literal("\\").then_some(())?;
        let escaped = |c: char| !(c.is_ascii_digit() || c == 'x' || c == 'u' || is_eol_char(c));
        let ch = p.s.char_where(escaped, ANY_CHARACTER)?;
        Some(match ch {
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{b}',
            other => other,
        })
    });

    // "\\0" !digit
    let mut ch = simple.or_else(|| {
        p.attempt(|p| {
            p.literal("\\0").then_some(())?;
            let digit = p.lookahead(|p| p.s.char_where(|c| c.is_ascii_digit(), "[0-9]").is_some());
            (!digit).then_some('\0')
        })
    });
    // "\\x" hexDigit{2} / "\\u" hexDigit{4}
    for (prefix, count) in [("\\x", 2), ("\\u", 4)] {
        if ch.is_none() {
            ch = p.attempt(|p| {
                p.literal(prefix).then_some(())?;
                hex_digits(p, count)
            });
        }
    }

    if let Some(ch) = ch {
        out.push(ch);
        return true;
    }

    // "\\" eol
    let eol = p.attempt(|p| {
        p.literal("\\").then_some(())?;
        eol(p)
    });
    match eol {
        Some(eol) => {
            out.push_str(eol);
            true
        }
        None => false,
    }
}

fn hex_digits(p: &mut Parser, count: usize) -> Option<char> {
    let mut code = 0;
    for _ in 0..count {
        let digit = p.s.char_where(|c| c.is_ascii_hexdigit(), "[0-9a-fA-F]")?;
        code = code * 16 + digit.to_digit(16)?;
    }
    // lone surrogates have no `char` representation
    Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
}

// "character class" = "[" "^"? (classCharacterRange / classCharacter)* "]" "i"? __
fn class(p: &mut Parser) -> Option<CharClass> {
    p.named("character class", |p| {
        p.literal("[").then_some(())?;
        let inverted = p.literal("^");

        let mut parts = Vec::new();
        let mut raw_parts = String::new();
        while let Some((part, raw)) = class_part(p) {
            parts.push(part);
            raw_parts.push_str(&raw);
        }

        p.literal("]").then_some(())?;
        let ignore_case = p.literal("i");
        skip(p);

        let raw_text = format!(
            "[{}{raw_parts}]{}",
            if inverted { "^" } else { "" },
            if ignore_case { "i" } else { "" }
        );
        Some(CharClass {
            parts,
            raw_text,
            inverted,
            ignore_case,
        })
    })
}

// classCharacter "-" classCharacter / classCharacter
fn class_part(p: &mut Parser) -> Option<(ClassPart, String)> {
    let start = p.offset();

    let range = p.attempt(|p| {
        let begin = class_character(p)?;
        p.literal("-").then_some(())?;
        let end = class_character(p)?;
        Some((begin, end))
    });

    if let Some(((begin, begin_raw), (end, end_raw))) = range {
        let raw = format!("{begin_raw}-{end_raw}");
        if begin > end && p.invalid_range.is_none() {
            p.invalid_range = Some(GrammarError::InvalidCharacterRange {
                range: raw.clone(),
                span: p.span_since(start),
            });
        }
        return Some((ClassPart::Range(begin, end), raw));
    }

    let (ch, raw) = class_character(p)?;
    Some((ClassPart::Char(ch), raw))
}

// !("]" / "\\" / eolChar) . / escapeSequence
fn class_character(p: &mut Parser) -> Option<(char, String)> {
    let simple = |c: char| c != ']' && c != '\\' && !is_eol_char(c);
    let ch = match p.s.char_where(simple, ANY_CHARACTER) {
        Some(ch) => ch,
        None => {
            let mut escaped = String::new();
            if !escape_sequence(p, &mut escaped) {
                return None;
            }
            // an escaped `\r\n` only contributes its first character
            escaped.chars().next()?
        }
    };
    Some((ch, quote_class_char(ch)))
}

// (whitespace / eol / comment)*
fn skip(p: &mut Parser) {
    loop {
        if p.s.char_where(is_whitespace, "whitespace").is_some() {
            continue;
        }
        if eol(p).is_some() {
            continue;
        }
        if comment(p) {
            continue;
        }
        break;
    }
}

// "end of line" = "\n" / "\r\n" / "\r" / "\u2028" / "\u2029"
fn eol(p: &mut Parser) -> Option<&'static str> {
    p.named("end of line", |p| {
        ["\n", "\r\n", "\r", "\u{2028}", "\u{2029}"]
            .into_iter()
            .find(|eol| p.literal(eol))
    })
}

// "comment" = "//" (!eolChar .)* / "/*" (!"*/" .)* "*/"
fn comment(p: &mut Parser) -> bool {
    p.named("comment", |p| {
        if p.literal("//") {
            while p.s.char_where(|c| !is_eol_char(c), ANY_CHARACTER).is_some() {}
            return Some(());
        }

        p.literal("/*").then_some(())?;
        while !p.lookahead(|p| p.literal("*/")) {
            p.s.any()?;
        }
        p.literal("*/").then_some(())
    })
    .is_some()
}

fn is_eol_char(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_whitespace(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t'
            | '\u{b}'
            | '\u{c}'
            | '\u{a0}'
            | '\u{feff}'
            | '\u{1680}'
            | '\u{180e}'
            | '\u{2000}'..='\u{200a}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_rule(src: &str) -> Expr {
        let grammar = parse(src).unwrap();
        grammar.rules.into_iter().next().unwrap().expression
    }

    #[test]
    fn test_rules_and_start() {
        let grammar = parse(
            "{ init code }\n\
             start = a:\"x\" b:[0-9]+ { value }\n\
             other \"display\" = start / 'y'i;",
        )
        .unwrap();

        assert_eq!(grammar.initializer.unwrap().code, " init code ");
        assert_eq!(grammar.start_rule, "start");
        assert_eq!(grammar.rules.len(), 2);

        let ExprKind::Action { expression, code, .. } = &grammar.rules[0].expression.kind else {
            panic!("expected action");
        };
        assert_eq!(code, " value ");
        let ExprKind::Sequence(elements) = &expression.kind else {
            panic!("expected sequence");
        };
        assert!(matches!(&elements[0].kind, ExprKind::Labeled { label, .. } if label == "a"));
        let ExprKind::Labeled { expression, .. } = &elements[1].kind else {
            panic!("expected label");
        };
        assert!(matches!(expression.kind, ExprKind::OneOrMore(_)));

        let ExprKind::Named { name, expression } = &grammar.rules[1].expression.kind else {
            panic!("expected named");
        };
        assert_eq!(name, "display");
        let ExprKind::Choice(alternatives) = &expression.kind else {
            panic!("expected choice");
        };
        assert!(matches!(&alternatives[0].kind, ExprKind::RuleRef(name) if name == "start"));
        assert!(matches!(
            &alternatives[1].kind,
            ExprKind::Literal { value, ignore_case: true } if value == "y"
        ));
    }

    #[test]
    fn test_collapsing() {
        // single element sequences and parentheses add no nodes
        assert!(matches!(parse_rule("a = ((b))").kind, ExprKind::RuleRef(_)));
        assert!(matches!(parse_rule("a = b c").kind, ExprKind::Sequence(ref e) if e.len() == 2));
        assert!(matches!(parse_rule("a = ").kind, ExprKind::Sequence(ref e) if e.is_empty()));

        let ExprKind::Action { expression, .. } = parse_rule("a = b { x }").kind else {
            panic!("expected action");
        };
        assert!(matches!(expression.kind, ExprKind::RuleRef(_)));
    }

    #[test]
    fn test_nested_groups() {
        // every level is parsed once, deep nesting stays cheap
        let depth = 64;
        let src = format!("a = {}'x' {{ v }}{}", "(".repeat(depth), ")".repeat(depth));
        let ExprKind::Action { expression, .. } = parse_rule(&src).kind else {
            panic!("expected action");
        };
        assert!(matches!(expression.kind, ExprKind::Literal { ref value, .. } if value == "x"));
    }

    #[test]
    fn test_prefixes() {
        let ExprKind::Sequence(elements) = parse_rule("a = &b !c &{ p } !{ q } d? e* .").kind
        else {
            panic!("expected sequence");
        };
        let kinds = elements.iter().map(Expr::kind_name).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                "simple_and",
                "simple_not",
                "semantic_and",
                "semantic_not",
                "optional",
                "zero_or_more",
                "any"
            ]
        );
    }

    #[test]
    fn test_escapes() {
        let ExprKind::Literal { value, .. } = parse_rule(r#"a = "\x41\u0042\n\t\'\"\v\0\q""#).kind
        else {
            panic!("expected literal");
        };
        assert_eq!(value, "AB\n\t'\"\u{b}\0q");

        let ExprKind::Literal { value, .. } = parse_rule("a = 'line\\\ncontinued'").kind else {
            panic!("expected literal");
        };
        assert_eq!(value, "line\ncontinued");
    }

    #[test]
    fn test_class() {
        let ExprKind::Class(class) = parse_rule(r"a = [^a-z\]_\n]i").kind else {
            panic!("expected class");
        };
        assert!(class.inverted);
        assert!(class.ignore_case);
        assert_eq!(class.raw_text, r"[^a-z\]_\n]i");
        assert_eq!(
            class.parts,
            [
                ClassPart::Range('a', 'z'),
                ClassPart::Char(']'),
                ClassPart::Char('_'),
                ClassPart::Char('\n'),
            ]
        );
    }

    #[test]
    fn test_invalid_range() {
        let err = parse("a = [z-a]").unwrap_err();
        assert!(matches!(&err, GrammarError::InvalidCharacterRange { range, .. } if range == "z-a"));
        assert_eq!(err.to_string(), "Invalid character range: z-a.");
    }

    #[test]
    fn test_comments() {
        let grammar = parse(
            "// leading\n\
             a /* inline */ = b // trailing\n\
             /* multi\n line */ b = 'b'",
        )
        .unwrap();
        assert_eq!(grammar.rules.len(), 2);
    }

    #[test]
    fn test_syntax_error() {
        let GrammarError::Syntax(err) = parse("a = \"x").unwrap_err() else {
            panic!("expected syntax error");
        };
        assert_eq!(err.offset, 4);
        assert_eq!((err.line, err.column), (1, 5));
        assert_eq!(err.found.as_deref(), Some("\""));
        assert!(err.expected.iter().any(|e| e == "literal"));
        assert!(err.expected.iter().any(|e| e == "action"));
        assert!(err.expected.iter().any(|e| e == "identifier"));

        let GrammarError::Syntax(err) = parse("").unwrap_err() else {
            panic!("expected syntax error");
        };
        assert_eq!(err.found, None);
        assert!(err.message.ends_with("but end of input found."));
    }
}
