use std::fmt::Write;

/// Turns `s` into a double quoted string literal that is safe to show in
/// messages, escaping control and non-ASCII characters.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\0'..='\u{1f}' | '\u{80}'.. => escape(&mut out, ch),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Escapes a single character for use inside the brackets of a character class.
pub fn quote_class_char(ch: char) -> String {
    let mut out = String::new();
    match ch {
        '\\' => out.push_str("\\\\"),
        '/' => out.push_str("\\/"),
        ']' => out.push_str("\\]"),
        '-' => out.push_str("\\-"),
        '\0' => out.push_str("\\0"),
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\u{b}' => out.push_str("\\x0B"),
        '\u{c}' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        '\u{1}'..='\u{1f}' | '\u{80}'.. => escape(&mut out, ch),
        _ => out.push(ch),
    }
    out
}

fn escape(out: &mut String, ch: char) {
    let code = ch as u32;
    if code <= 0xFF {
        let _ = write!(out, "\\x{code:02X}");
    } else {
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            let _ = write!(out, "\\u{unit:04X}");
        }
    }
}

#[test]
fn test_quote() {
    assert_eq!(quote("abc"), "\"abc\"");
    assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
    assert_eq!(quote("\n\t\r"), "\"\\n\\t\\r\"");
    assert_eq!(quote("\u{1}"), "\"\\x01\"");
    assert_eq!(quote("\u{e9}"), "\"\\xE9\"");
    assert_eq!(quote("\u{2028}"), "\"\\u2028\"");
    assert_eq!(quote("\u{1F600}"), "\"\\uD83D\\uDE00\"");
}

#[test]
fn test_quote_class_char() {
    assert_eq!(quote_class_char('a'), "a");
    assert_eq!(quote_class_char(']'), "\\]");
    assert_eq!(quote_class_char('-'), "\\-");
    assert_eq!(quote_class_char('\u{b}'), "\\x0B");
    assert_eq!(quote_class_char('\u{3000}'), "\\u3000");
}
