//! Parsers generated at build time from `grammar.peg`, one module per option
//! set. The tests run them side by side with the in-process matcher.

include!(concat!(env!("OUT_DIR"), "/parsers.rs"));

#[cfg(test)]
mod tests {
    use pegleg_gen::{Actions, Context, Matcher, Options};
    use pegleg_runtime::{ActionError, ParseError, Value};

    use super::{cached, plain};

    const GRAMMAR: &str = include_str!("../grammar.peg");

    type Generated = fn(&str, Option<&str>) -> Result<Value, ParseError>;

    fn label<'a>(cx: &Context<'a>, name: &str) -> &'a Value {
        cx.label(name).unwrap()
    }

    fn actions() -> Actions {
        Actions::new()
            .action(r#"Ok(Value::from(format!("{}|{}", list, groups)))"#, |cx| {
                let (list, groups) = (label(cx, "list"), label(cx, "groups"));
                Ok(Value::from(format!("{list}|{groups}")))
            })
            .action("Ok(n.clone())", |cx| Ok(label(cx, "n").clone()))
            .action("Ok(join(head, tail))", |cx| {
                Ok(plain::join(label(cx, "head"), label(cx, "tail")))
            })
            .predicate(r#"Ok(text(digits) == "13")"#, |cx| {
                Ok(plain::text(label(cx, "digits")) == "13")
            })
            .action("Ok(Value::from(text(digits)))", |cx| {
                Ok(Value::from(plain::text(label(cx, "digits"))))
            })
            .action("Ok(inner.clone())", |cx| Ok(label(cx, "inner").clone()))
            .predicate("Ok(word.as_array().map_or(0, Vec::len) <= 3)", |cx| {
                Ok(label(cx, "word").as_array().map_or(0, Vec::len) <= 3)
            })
            .action("Ok(Value::from(text(word)))", |cx| {
                Ok(Value::from(plain::text(label(cx, "word"))))
            })
            .action("Ok(Value::from(offset))", |cx| Ok(Value::from(cx.offset())))
            .action(r#"Err(ActionError::new("bang"))"#, |_| {
                Err(ActionError::new("bang"))
            })
            .action("Ok(Value::Null)", |_| Ok(Value::Null))
    }

    fn variants() -> [(Generated, Matcher); 2] {
        let line_column = Options {
            cache: true,
            track_line_and_column: true,
        };
        [
            (
                plain::parse as Generated,
                pegleg_gen::build_parser(GRAMMAR, actions(), Options::default()).unwrap(),
            ),
            (
                cached::parse as Generated,
                pegleg_gen::build_parser(GRAMMAR, actions(), line_column).unwrap(),
            ),
        ]
    }

    #[test]
    fn test_results() {
        for (parse, matcher) in variants() {
            let expected = Value::from(r#"["1","2"]|[["3"],"abc",12]"#);
            assert_eq!(parse("1,2|(3)<abc>@", None).unwrap(), expected);
            assert_eq!(matcher.parse("1,2|(3)<abc>@", None).unwrap(), expected);

            // the vetoed `~` alternative backtracks into `~ ~`
            let expected = Value::from(r#"["7"]|[["~","~"],""]"#);
            assert_eq!(parse("7|~~()", None).unwrap(), expected);

            assert_eq!(parse("42", Some("number")).unwrap(), Value::from("42"));
        }
    }

    #[test]
    fn test_errors() {
        for (parse, _) in variants() {
            let Err(ParseError::Syntax(e)) = parse("13|", None) else {
                panic!("expected syntax error");
            };
            assert_eq!((e.offset, e.line, e.column), (0, 1, 1));
            assert_eq!(e.message, "Expected number but \"1\" found.");

            assert_eq!(
                parse("1|!", None),
                Err(ParseError::Action(ActionError::new("bang")))
            );
            assert_eq!(
                parse("1|", Some("nope")),
                Err(ParseError::InvalidStartRule("nope".to_owned()))
            );
        }
    }

    #[test]
    fn test_same_as_matcher() {
        let inputs = [
            "",
            "1",
            "1|",
            "1,2,3|",
            "1,13|",
            "13|",
            "1|(2,3)(4)",
            "1|(",
            "1|<ab><XYZ>",
            "1|<abcd>",
            "1|@@",
            "1|!",
            "1|~",
            "1|~~~",
            "1|\n",
            "1|()x",
        ];

        for (parse, matcher) in variants() {
            for input in inputs {
                for start_rule in [None, Some("list"), Some("group"), Some("nope")] {
                    assert_eq!(
                        parse(input, start_rule),
                        matcher.parse(input, start_rule),
                        "{input:?} from {start_rule:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_rule_names() {
        assert_eq!(plain::RULE_NAMES, ["start", "list", "number", "group"]);
        assert_eq!(cached::RULE_NAMES, plain::RULE_NAMES);
    }
}
