//! Strict string-literal encoding for in-page scripts.
//!
//! Every piece of user-supplied text (article titles, body content,
//! selectors) is embedded into evaluated scripts exclusively through
//! [`js_string`], so quotes, backticks, and newlines in the text cannot
//! break out of the literal.

/// Encode `s` as a double-quoted JS string literal.
///
/// The output uses JSON-compatible escaping (JSON string syntax is a valid
/// JS literal subset); U+2028/U+2029 are escaped too since older JS
/// grammars reject them raw inside literals.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
