use std::sync::Arc;

use cranelift_entity::{EntityRef, PrimaryMap};
use pegleg_runtime::{
    empty, ActionError, CharClass, LineColumn, Offset, ParseError, Position, Registers, State,
    Value,
};

use crate::{
    actions::{ActionFn, Actions, Context, PredicateFn},
    error::BuildError,
    program::{CodeId, CodeKind, Op, OpKind, Program, RuleId},
    Compiled, Options,
};

enum Handler {
    Action(Arc<ActionFn>),
    Predicate(Arc<PredicateFn>),
}

/// A compiled grammar bound to host implementations of its code blocks.
///
/// Every call to [`Matcher::parse`] owns its own state, so one matcher can be
/// shared between threads.
pub struct Matcher {
    program: Program,
    handlers: PrimaryMap<CodeId, Handler>,
    options: Options,
    source: String,
}

impl Matcher {
    pub fn new(
        compiled: Compiled,
        actions: &Actions,
        options: Options,
    ) -> Result<Matcher, BuildError> {
        let Compiled {
            program, source, ..
        } = compiled;

        let mut handlers = PrimaryMap::with_capacity(program.code.len());
        for site in program.code.values() {
            let handler = match site.kind {
                CodeKind::Action => actions.find_action(&site.code).map(Handler::Action),
                CodeKind::Predicate => actions.find_predicate(&site.code).map(Handler::Predicate),
            };
            let Some(handler) = handler else {
                let code = site.code.trim().to_owned();
                return Err(match site.kind {
                    CodeKind::Action => BuildError::MissingAction { code },
                    CodeKind::Predicate => BuildError::MissingPredicate { code },
                });
            };
            handlers.push(handler);
        }

        Ok(Matcher {
            program,
            handlers,
            options,
            source,
        })
    }

    /// Parses the whole of `input` starting from `start_rule`, or from the
    /// grammar's first rule.
    pub fn parse(&self, input: &str, start_rule: Option<&str>) -> Result<Value, ParseError> {
        let start = match start_rule {
            Some(name) => self
                .program
                .rule_id(name)
                .ok_or_else(|| ParseError::InvalidStartRule(name.to_owned()))?,
            None => self.program.start,
        };

        match self.options.track_line_and_column {
            true => self.run::<LineColumn>(input, start),
            false => self.run::<Offset>(input, start),
        }
    }

    /// The Rust source of the same parser.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn start_rule(&self) -> &str {
        &self.program.rules[self.program.start].name
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.program.rule_names()
    }

    pub fn options(&self) -> Options {
        self.options
    }

    fn run<P: Position>(&self, input: &str, start: RuleId) -> Result<Value, ParseError> {
        let mut s = match self.options.cache {
            true => State::<P>::with_cache(input),
            false => State::<P>::new(input),
        };
        let result = self.call(&mut s, start)?;
        Ok(s.finish(result)?)
    }

    fn call<P: Position>(
        &self,
        s: &mut State<'_, P>,
        id: RuleId,
    ) -> Result<Option<Value>, ActionError> {
        if let Some(result) = s.cached(id.index()) {
            return Ok(result);
        }

        let rule = &self.program.rules[id];
        let start = s.save();

        let mut regs = Registers::new(rule.register_count);
        self.eval(s, &mut regs, &rule.body)?;
        let result = regs.take(rule.body.result);

        s.store(id.index(), &start, &result);
        Ok(result)
    }

    fn eval<P: Position>(
        &self,
        s: &mut State<'_, P>,
        regs: &mut Registers<P>,
        op: &Op,
    ) -> Result<(), ActionError> {
        let r = op.result;
        match &op.kind {
            OpKind::Named { description, body } => {
                s.silence();
                self.eval(s, regs, body)?;
                s.unsilence();
                if !regs.is_match(r) {
                    s.fail(description);
                }
            }
            OpKind::Choice(alternatives) => {
                for alternative in alternatives {
                    self.eval(s, regs, alternative)?;
                    if regs.is_match(r) {
                        break;
                    }
                }
            }
            OpKind::Action {
                pos,
                body,
                code,
                params,
            } => {
                regs.set_pos(*pos, s.save());
                self.eval(s, regs, body)?;
                if regs.is_match(r) {
                    let start = regs.pos(*pos);
                    let value = {
                        let cx = self.context(s, &start, regs.value(r), regs, *code, params);
                        self.run_action(*code, &cx)?
                    };
                    match value {
                        // null vetoes the match
                        Value::Null => {
                            regs.set(r, None);
                            s.restore(start);
                        }
                        value => regs.set(r, Some(value)),
                    }
                }
            }
            OpKind::Sequence { pos, elements } => {
                regs.set_pos(*pos, s.save());
                let mut matched = true;
                for element in elements {
                    self.eval(s, regs, element)?;
                    if !regs.is_match(element.result) {
                        matched = false;
                        break;
                    }
                }

                if matched {
                    // labeled elements may still be read by enclosing actions
                    let values = elements
                        .iter()
                        .map(|element| regs.value(element.result).clone())
                        .collect();
                    regs.set(r, Some(Value::Array(values)));
                } else {
                    regs.set(r, None);
                    s.restore(regs.pos(*pos));
                }
            }
            OpKind::SimpleAnd { pos, body } => {
                regs.set_pos(*pos, s.save());
                s.silence();
                self.eval(s, regs, body)?;
                s.unsilence();

                if regs.is_match(r) {
                    regs.set(r, Some(empty()));
                    s.restore(regs.pos(*pos));
                } else {
                    regs.set(r, None);
                }
            }
            OpKind::SimpleNot { pos, body } => {
                regs.set_pos(*pos, s.save());
                s.silence();
                self.eval(s, regs, body)?;
                s.unsilence();

                if regs.is_match(r) {
                    regs.set(r, None);
                    s.restore(regs.pos(*pos));
                } else {
                    regs.set(r, Some(empty()));
                }
            }
            OpKind::SemanticAnd { code, params } => {
                let pass = self.check_predicate(s, regs, *code, params)?;
                regs.set(r, pass.then(empty));
            }
            OpKind::SemanticNot { code, params } => {
                let pass = self.check_predicate(s, regs, *code, params)?;
                regs.set(r, (!pass).then(empty));
            }
            OpKind::Optional(body) => {
                self.eval(s, regs, body)?;
                if !regs.is_match(r) {
                    regs.set(r, Some(empty()));
                }
            }
            OpKind::ZeroOrMore(body) => {
                let items = self.repeat(s, regs, body)?;
                regs.set(r, Some(Value::Array(items)));
            }
            OpKind::OneOrMore(body) => {
                let items = self.repeat(s, regs, body)?;
                regs.set(r, (!items.is_empty()).then(|| Value::Array(items)));
            }
            OpKind::Call(id) => {
                let result = self.call(s, *id)?;
                regs.set(r, result);
            }
            OpKind::Literal {
                value,
                ignore_case,
                description,
            } => {
                let result = match ignore_case {
                    true => s.literal_ignore_case(value, description),
                    false => s.literal(value, description),
                };
                regs.set(r, result);
            }
            OpKind::Class {
                parts,
                inverted,
                ignore_case,
                description,
            } => {
                let class = CharClass {
                    parts,
                    inverted: *inverted,
                    ignore_case: *ignore_case,
                };
                let result = s.class(&class, description);
                regs.set(r, result);
            }
            OpKind::Any => {
                let result = s.any();
                regs.set(r, result);
            }
        }
        Ok(())
    }

    /// Collects matches of `body` until it fails or stops consuming input.
    fn repeat<P: Position>(
        &self,
        s: &mut State<'_, P>,
        regs: &mut Registers<P>,
        body: &Op,
    ) -> Result<Vec<Value>, ActionError> {
        let mut items = Vec::new();
        loop {
            let before = s.offset();
            self.eval(s, regs, body)?;
            let Some(item) = regs.take(body.result) else {
                break;
            };
            items.push(item);
            if s.offset() == before {
                break;
            }
        }
        Ok(items)
    }

    fn check_predicate<P: Position>(
        &self,
        s: &State<'_, P>,
        regs: &Registers<P>,
        code: CodeId,
        params: &[usize],
    ) -> Result<bool, ActionError> {
        static NOTHING: Value = Value::Null;

        let cx = self.context(s, s.pos(), &NOTHING, regs, code, params);
        match &self.handlers[code] {
            Handler::Predicate(f) => f(&cx),
            Handler::Action(_) => unreachable!("Predicate bound to an action"),
        }
    }

    fn run_action(&self, code: CodeId, cx: &Context<'_>) -> Result<Value, ActionError> {
        match &self.handlers[code] {
            Handler::Action(f) => f(cx),
            Handler::Predicate(_) => unreachable!("Action bound to a predicate"),
        }
    }

    fn context<'a, P: Position>(
        &'a self,
        s: &State<'a, P>,
        start: &P,
        matched: &'a Value,
        regs: &'a Registers<P>,
        code: CodeId,
        params: &[usize],
    ) -> Context<'a> {
        let names = &self.program.code[code].params;
        Context {
            input: s.input(),
            offset: start.offset(),
            end: s.offset(),
            line_column: start.line_column(),
            matched,
            labels: names
                .iter()
                .zip(params)
                .map(|(name, &slot)| (name.as_str(), regs.value(slot)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pegleg_runtime::SyntaxError;

    use super::*;
    use crate::build_parser;

    fn matcher(grammar: &str, options: Options) -> Matcher {
        build_parser(grammar, Actions::passthrough(), options).unwrap()
    }

    fn syntax_error(result: Result<Value, ParseError>) -> SyntaxError {
        match result {
            Err(ParseError::Syntax(e)) => e,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_rightmost_failure() {
        let m = matcher("start = 'abc' / 'abd'", Options::default());
        assert_eq!(m.parse("abd", None).unwrap(), Value::from("abd"));

        let e = syntax_error(m.parse("abx", None));
        assert_eq!(e.offset, 2);
        assert_eq!(e.expected, ["\"abc\"", "\"abd\""]);
        assert_eq!(e.message, "Expected \"abc\" or \"abd\" but \"x\" found.");
    }

    #[test]
    fn test_ordered_choice() {
        let m = matcher("start = ('ab' / 'a') 'c'", Options::default());
        assert_eq!(
            m.parse("abc", None).unwrap(),
            serde_json::json!(["ab", "c"])
        );
        assert_eq!(m.parse("ac", None).unwrap(), serde_json::json!(["a", "c"]));

        let e = syntax_error(m.parse("a", None));
        assert_eq!(e.offset, 1);
        assert_eq!(e.expected, ["\"ab\"", "\"c\""]);
        assert_eq!(e.found, None);
    }

    #[test]
    fn test_repetition_boundaries() {
        let zero = matcher("start = 'a'*", Options::default());
        assert_eq!(zero.parse("", None).unwrap(), serde_json::json!([]));
        assert_eq!(zero.parse("aa", None).unwrap(), serde_json::json!(["a", "a"]));

        let one = matcher("start = 'a'+", Options::default());
        let e = syntax_error(one.parse("", None));
        assert_eq!((e.offset, e.expected.as_slice()), (0, &["\"a\"".to_owned()][..]));

        // a body matching the empty string does not loop forever
        let empty = matcher("start = ('a'?)*", Options::default());
        assert_eq!(empty.parse("", None).unwrap(), serde_json::json!([""]));
    }

    #[test]
    fn test_predicate_veto() {
        let actions = Actions::new().predicate("return n.join(\"\") !== \"0\";", |cx| {
            let digits = cx.label("n").and_then(Value::as_array).into_iter().flatten();
            let number = digits.filter_map(Value::as_str).collect::<String>();
            Ok(number != "0")
        });
        let m = build_parser(
            "start = N / .
             N = n:[0-9]+ &{ return n.join(\"\") !== \"0\"; }",
            actions,
            Options::default(),
        )
        .unwrap();

        assert_eq!(
            m.parse("10", None).unwrap(),
            serde_json::json!([["1", "0"], ""])
        );
        // N fails without consuming, so `.` gets to match the same digit
        assert_eq!(m.parse("0", None).unwrap(), Value::from("0"));
        assert_eq!(
            m.parse("0", Some("N")).unwrap_err().to_string(),
            "Expected [0-9] but end of input found."
        );
    }

    #[test]
    fn test_semantic_not() {
        let actions = Actions::passthrough().predicate("return x === \"a\";", |cx| {
            Ok(cx.label("x") == Some(&Value::from("a")))
        });
        let m = build_parser(
            "start = x:. !{ return x === \"a\"; } . / 'a' [a-z]*",
            actions,
            Options::default(),
        )
        .unwrap();

        assert_eq!(m.parse("bb", None).unwrap(), serde_json::json!(["b", "", "b"]));
        // the vetoed alternative gives its input back to the next one
        assert_eq!(
            m.parse("ab", None).unwrap(),
            serde_json::json!(["a", ["b"]])
        );
        assert_eq!(
            m.parse("b", None).unwrap_err().to_string(),
            "Expected any character but end of input found."
        );
    }

    #[test]
    fn test_actions() {
        let actions = Actions::new()
            .action("return a + b;", |cx| {
                let a = cx.label("a").and_then(Value::as_str).unwrap_or_default();
                let b = cx.label("b").and_then(Value::as_str).unwrap_or_default();
                assert_eq!(cx.text(), format!("{a}{b}"));
                Ok(Value::from(format!("{b}{a}")))
            })
            .action("return null;", |_| Ok(Value::Null))
            .action("fail", |_| Err(ActionError::new("boom")));

        let m = build_parser(
            "start = veto / a:'x' b:[a-z] { return a + b; } / 'e' { fail }
             veto = 'v' { return null; }",
            actions,
            Options::default(),
        )
        .unwrap();

        assert_eq!(m.parse("xy", None).unwrap(), Value::from("yx"));

        let e = syntax_error(m.parse("v", None));
        assert_eq!(e.offset, 0);

        let e = m.parse("e", None).unwrap_err();
        assert_eq!(e, ParseError::Action(ActionError::new("boom")));
        assert_eq!(e.to_string(), "Action failed: boom");
    }

    #[test]
    fn test_action_positions() {
        let actions = Actions::new()
            .action("pos", |cx| Ok(serde_json::json!([cx.offset(), cx.line_column()])));
        let grammar = "start = '\\n'* ('ab' { pos })";

        let offsets = build_parser(grammar, actions.clone(), Options::default()).unwrap();
        assert_eq!(
            offsets.parse("\n\nab", None).unwrap(),
            serde_json::json!([["\n", "\n"], [2, null]])
        );

        let options = Options {
            track_line_and_column: true,
            ..Options::default()
        };
        let lines = build_parser(grammar, actions, options).unwrap();
        assert_eq!(
            lines.parse("\n\nab", None).unwrap(),
            serde_json::json!([["\n", "\n"], [2, [3, 1]]])
        );

        let e = syntax_error(lines.parse("\n\nax", None));
        assert_eq!((e.offset, e.line, e.column), (3, 3, 2));
    }

    #[test]
    fn test_cache_transparency() {
        let grammar = "
            start = (a 'x' / a 'y' / b)*
            a = [a-c]+ !'z'
            b \"b\" = 'b'+ 'q'
        ";
        let plain = matcher(grammar, Options::default());
        let cached = matcher(
            grammar,
            Options {
                cache: true,
                ..Options::default()
            },
        );

        for input in ["", "abx", "aby", "cx", "bbq", "az", "abz", "bbbz", "cxbq!"] {
            assert_eq!(plain.parse(input, None), cached.parse(input, None), "{input}");
        }
    }

    #[test]
    fn test_proxy_transparency() {
        let proxied = matcher("A = B; B = 'x'", Options::default());
        let direct = matcher("B = 'x'", Options::default());

        assert_eq!(proxied.start_rule(), "B");
        assert_eq!(proxied.parse("x", None), direct.parse("x", None));
        assert_eq!(proxied.parse("y", None), direct.parse("y", None));
    }

    #[test]
    fn test_start_rule() {
        let m = matcher("a = 'a'; b = 'b'", Options::default());
        assert_eq!(m.rule_names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(m.parse("b", Some("b")).unwrap(), Value::from("b"));

        let e = m.parse("b", Some("c")).unwrap_err();
        assert_eq!(e, ParseError::InvalidStartRule("c".to_owned()));
        assert_eq!(e.to_string(), "Invalid rule name: \"c\".");
    }

    #[test]
    fn test_named_rule() {
        let m = matcher("start = digit+; digit \"digit\" = [0-9]", Options::default());
        let e = syntax_error(m.parse("1a", None));
        assert_eq!(e.expected, ["digit"]);
        assert_eq!(e.message, "Expected digit but \"a\" found.");
    }

    #[test]
    fn test_missing_handler() {
        let err = build_parser("start = 'a' { code }", Actions::new(), Options::default())
            .err()
            .unwrap();
        assert_eq!(err, BuildError::MissingAction { code: "code".to_owned() });
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Matcher>();
    }
}
