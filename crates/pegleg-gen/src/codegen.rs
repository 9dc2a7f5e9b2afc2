//! Emits a standalone Rust module implementing the parser on top of
//! `pegleg-runtime`.
//!
//! Every rule becomes a function owning a [`Registers`] block sized by the
//! allocator, code blocks become plain functions taking the offset and the
//! visible labels. Action code must evaluate to `Result<Value, ActionError>`,
//! predicate code to `Result<bool, ActionError>`.
//!
//! [`Registers`]: pegleg_runtime::Registers

use std::{collections::HashSet, fmt::Write};

use cranelift_entity::{EntityRef, SecondaryMap};
use pegleg_runtime::ClassPart;

use crate::{
    program::{CodeKind, Op, OpKind, Program, RuleId},
    Options,
};

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "do", "final", "macro", "override", "priv", "try", "typeof",
    "unsized", "virtual", "yield", "gen",
];

/// Names that cannot be used even as raw identifiers, or that would collide
/// with the parameters every code function receives.
const RESERVED: &[&str] = &[
    "self", "Self", "super", "crate", "_", "offset", "line", "column",
];

/// Turns a grammar identifier into a valid Rust identifier.
fn sanitize(name: &str) -> String {
    let name = name.replace('$', "_");
    if RESERVED.contains(&name.as_str()) {
        format!("{name}_")
    } else if KEYWORDS.contains(&name.as_str()) {
        format!("r#{name}")
    } else {
        name
    }
}

/// Rust names of code function parameters, distinct even when labels differ
/// only in characters that [`sanitize`] replaces.
fn param_names(labels: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    labels
        .iter()
        .map(|label| {
            let base = sanitize(label);
            let mut name = base.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// Formats Rust source, returning it unchanged if it does not parse.
pub fn please_format(source: String) -> String {
    match syn::parse_file(&source) {
        Ok(file) => prettyplease::unparse(&file),
        Err(e) => {
            log::warn!("Generated source does not parse, leaving it unformatted: {e}");
            source
        }
    }
}

pub fn generate(program: &Program, options: &Options) -> String {
    let mut cx = CodegenCx::new(program, options);
    cx.file();
    please_format(cx.out)
}

struct CodegenCx<'a> {
    program: &'a Program,
    options: &'a Options,
    fn_names: SecondaryMap<RuleId, String>,
    out: String,
    /// Counter for block labels and loop locals, unique within a function.
    next_label: u32,
}

#[allow(unused_must_use)]
impl<'a> CodegenCx<'a> {
    fn new(program: &'a Program, options: &'a Options) -> CodegenCx<'a> {
        let mut used = HashSet::new();
        let mut fn_names = SecondaryMap::new();
        for (id, rule) in program.rules.iter() {
            let base = format!("parse_{}", rule.name.replace('$', "_"));
            let mut name = base.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            fn_names[id] = name;
        }

        CodegenCx {
            program,
            options,
            fn_names,
            out: String::new(),
            next_label: 0,
        }
    }

    fn pos_type(&self) -> &'static str {
        match self.options.track_line_and_column {
            true => "LineColumn",
            false => "Offset",
        }
    }

    fn file(&mut self) {
        let program = self.program;

        writeln!(self.out, "// Generated by pegleg, do not edit.");
        writeln!(
            self.out,
            "#![allow(unused_mut, unused_variables, unused_labels, unused_imports, non_snake_case, clippy::all)]"
        );
        writeln!(
            self.out,
            "use pegleg_runtime::{{empty, ActionError, CharClass, ClassPart, LineColumn, Offset, ParseError, Position, Registers, State, Value}};"
        );
        if let Some(initializer) = &program.initializer {
            writeln!(self.out, "{initializer}");
        }
        let pos_type = self.pos_type();
        writeln!(self.out, "type Pos = {pos_type};");

        write!(self.out, "pub const RULE_NAMES: &[&str] = &[");
        for name in program.rule_names() {
            write!(self.out, "{name:?}, ");
        }
        writeln!(self.out, "];");

        self.entry_point();
        for id in program.rules.keys() {
            self.rule(id);
        }
        for (id, site) in program.code.iter() {
            self.code_fn(id.index(), site.kind, &site.code, &site.params);
        }
    }

    fn entry_point(&mut self) {
        let program = self.program;
        let constructor = match self.options.cache {
            true => "with_cache",
            false => "new",
        };
        let default = &program.rules[program.start].name;

        writeln!(
            self.out,
            "pub fn parse(input: &str, start_rule: Option<&str>) -> Result<Value, ParseError> {{"
        );
        writeln!(self.out, "let mut s = State::<Pos>::{constructor}(input);");
        writeln!(self.out, "let result = match start_rule.unwrap_or({default:?}) {{");

        let mut seen = HashSet::new();
        for (id, rule) in program.rules.iter() {
            // later rules with the same name are unreachable
            if seen.insert(rule.name.as_str()) {
                writeln!(self.out, "{:?} => {}(&mut s)?,", rule.name, self.fn_names[id]);
            }
        }
        writeln!(
            self.out,
            "name => return Err(ParseError::InvalidStartRule(name.to_owned())),"
        );
        writeln!(self.out, "}};");
        writeln!(self.out, "Ok(s.finish(result)?)");
        writeln!(self.out, "}}");
    }

    fn rule(&mut self, id: RuleId) {
        let program = self.program;
        let rule = &program.rules[id];
        let caching = self.options.cache;
        self.next_label = 0;

        writeln!(
            self.out,
            "fn {}(s: &mut State<'_, Pos>) -> Result<Option<Value>, ActionError> {{",
            self.fn_names[id]
        );
        if caching {
            writeln!(
                self.out,
                "if let Some(result) = s.cached({}) {{ return Ok(result); }}",
                id.index()
            );
            writeln!(self.out, "let start = s.save();");
        }
        writeln!(
            self.out,
            "let mut r = Registers::<Pos>::new({});",
            rule.register_count
        );
        self.op(&rule.body);
        writeln!(self.out, "let result = r.take({});", rule.body.result);
        if caching {
            writeln!(self.out, "s.store({}, &start, &result);", id.index());
        }
        writeln!(self.out, "Ok(result)");
        writeln!(self.out, "}}");
    }

    fn code_fn(&mut self, index: usize, kind: CodeKind, code: &str, params: &[String]) {
        let (prefix, ret) = match kind {
            CodeKind::Action => ("action", "Value"),
            CodeKind::Predicate => ("predicate", "bool"),
        };

        write!(self.out, "fn {prefix}_{index}(offset: usize");
        if self.options.track_line_and_column {
            write!(self.out, ", line: usize, column: usize");
        }
        for param in param_names(params) {
            write!(self.out, ", {param}: &Value");
        }
        writeln!(self.out, ") -> Result<{ret}, ActionError> {{{code}}}");
    }

    /// Arguments of a code function, given an expression evaluating to the position.
    fn code_args(&self, pos: &str, params: &[usize]) -> String {
        let mut args = format!("{pos}.offset()");
        if self.options.track_line_and_column {
            write!(args, ", {pos}.line, {pos}.column");
        }
        for slot in params {
            write!(args, ", r.value({slot})");
        }
        args
    }

    fn label(&mut self) -> u32 {
        self.next_label += 1;
        self.next_label
    }

    fn op(&mut self, op: &Op) {
        let r = op.result;
        match &op.kind {
            OpKind::Named { description, body } => {
                writeln!(self.out, "s.silence();");
                self.op(body);
                writeln!(self.out, "s.unsilence();");
                writeln!(self.out, "if !r.is_match({r}) {{ s.fail({description:?}); }}");
            }
            OpKind::Choice(alternatives) => {
                let label = self.label();
                writeln!(self.out, "'c{label}: {{");
                for (i, alternative) in alternatives.iter().enumerate() {
                    self.op(alternative);
                    if i + 1 < alternatives.len() {
                        writeln!(self.out, "if r.is_match({r}) {{ break 'c{label}; }}");
                    }
                }
                writeln!(self.out, "}}");
            }
            OpKind::Action {
                pos,
                body,
                code,
                params,
            } => {
                writeln!(self.out, "r.set_pos({pos}, s.save());");
                self.op(body);
                writeln!(self.out, "if r.is_match({r}) {{");
                let args = self.code_args("start", params);
                writeln!(self.out, "let start = r.pos({pos});");
                writeln!(self.out, "let value = action_{}({args})?;", code.index());
                writeln!(
                    self.out,
                    "if value.is_null() {{ r.set({r}, None); s.restore(start); }} else {{ r.set({r}, Some(value)); }}"
                );
                writeln!(self.out, "}}");
            }
            OpKind::Sequence { pos, elements } => {
                let label = self.label();
                writeln!(self.out, "r.set_pos({pos}, s.save());");
                writeln!(self.out, "'s{label}: {{");
                for element in elements {
                    self.op(element);
                    writeln!(
                        self.out,
                        "if !r.is_match({}) {{ r.set({r}, None); s.restore(r.pos({pos})); break 's{label}; }}",
                        element.result
                    );
                }
                write!(self.out, "let items = vec![");
                for element in elements {
                    write!(self.out, "r.value({}).clone(), ", element.result);
                }
                writeln!(self.out, "];");
                writeln!(self.out, "r.set({r}, Some(Value::Array(items)));");
                writeln!(self.out, "}}");
            }
            OpKind::SimpleAnd { pos, body } | OpKind::SimpleNot { pos, body } => {
                let (on_match, on_fail) = match &op.kind {
                    OpKind::SimpleAnd { .. } => ("Some(empty())", "None"),
                    _ => ("None", "Some(empty())"),
                };
                writeln!(self.out, "r.set_pos({pos}, s.save());");
                writeln!(self.out, "s.silence();");
                self.op(body);
                writeln!(self.out, "s.unsilence();");
                writeln!(
                    self.out,
                    "if r.is_match({r}) {{ r.set({r}, {on_match}); s.restore(r.pos({pos})); }} else {{ r.set({r}, {on_fail}); }}"
                );
            }
            OpKind::SemanticAnd { code, params } | OpKind::SemanticNot { code, params } => {
                let negate = match &op.kind {
                    OpKind::SemanticNot { .. } => "!",
                    _ => "",
                };
                let args = self.code_args("s.pos()", params);
                writeln!(self.out, "let pass = predicate_{}({args})?;", code.index());
                writeln!(self.out, "r.set({r}, ({negate}pass).then(empty));");
            }
            OpKind::Optional(body) => {
                self.op(body);
                writeln!(self.out, "if !r.is_match({r}) {{ r.set({r}, Some(empty())); }}");
            }
            OpKind::ZeroOrMore(body) | OpKind::OneOrMore(body) => {
                let n = self.label();
                writeln!(self.out, "let mut items{n} = Vec::new();");
                writeln!(self.out, "loop {{");
                writeln!(self.out, "let before{n} = s.offset();");
                self.op(body);
                writeln!(
                    self.out,
                    "match r.take({}) {{ Some(item) => items{n}.push(item), None => break }}",
                    body.result
                );
                writeln!(self.out, "if s.offset() == before{n} {{ break; }}");
                writeln!(self.out, "}}");
                match &op.kind {
                    OpKind::ZeroOrMore(_) => {
                        writeln!(self.out, "r.set({r}, Some(Value::Array(items{n})));")
                    }
                    _ => writeln!(
                        self.out,
                        "r.set({r}, if items{n}.is_empty() {{ None }} else {{ Some(Value::Array(items{n})) }});"
                    ),
                };
            }
            OpKind::Call(id) => {
                writeln!(self.out, "r.set({r}, {}(s)?);", self.fn_names[*id]);
            }
            OpKind::Literal {
                value,
                ignore_case,
                description,
            } => {
                let method = match ignore_case {
                    true => "literal_ignore_case",
                    false => "literal",
                };
                writeln!(self.out, "r.set({r}, s.{method}({value:?}, {description:?}));");
            }
            OpKind::Class {
                parts,
                inverted,
                ignore_case,
                description,
            } => {
                write!(self.out, "r.set({r}, s.class(&CharClass {{ parts: &[");
                for part in parts {
                    match part {
                        ClassPart::Char(c) => write!(self.out, "ClassPart::Char({c:?}), "),
                        ClassPart::Range(a, b) => {
                            write!(self.out, "ClassPart::Range({a:?}, {b:?}), ")
                        }
                    };
                }
                writeln!(
                    self.out,
                    "], inverted: {inverted}, ignore_case: {ignore_case} }}, {description:?}));"
                );
            }
            OpKind::Any => {
                writeln!(self.out, "r.set({r}, s.any());");
            }
        }
    }
}
