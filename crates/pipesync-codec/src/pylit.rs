//! Python literal helpers shared by every codec.
//!
//! Generation goes through these so that arbitrary field values (quotes in a
//! filename, spaces in a variable name) still produce valid source, and parsing
//! goes through the inverse so that escaped values come back unchanged.

use regex::Regex;

/// Regex fragment matching a single- or double-quoted Python string literal.
///
/// Capture group 1 holds the body of a double-quoted literal, group 2 the body of
/// a single-quoted one. Pass the captures through [`literal_body`].
pub const STRING_LITERAL: &str = r#"(?:"((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)')"#;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Compile a pattern that is fixed at build time.
pub(crate) fn pattern(src: &str) -> Regex {
    Regex::new(src).expect("static codec pattern compiles")
}

/// `true` if `s` can be used as a Python variable name.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) && !KEYWORDS.contains(&s)
}

/// Turn `raw` into a usable identifier.
///
/// Invalid characters become `_`, a leading digit gets a `_` prefix, keywords get a
/// `_` suffix, and an empty name falls back to `fallback`.
pub fn sanitize_identifier(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    if is_identifier(trimmed) {
        return trimmed.to_string();
    }
    let mut out: String = trimmed
        .chars()
        .map(|c| if c == '_' || c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

fn escape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `"value"` with Python escapes.
pub fn quote_double(s: &str) -> String {
    escape(s, '"')
}

/// `'value'` with Python escapes.
pub fn quote_single(s: &str) -> String {
    escape(s, '\'')
}

/// Undo the escapes applied by [`quote_double`] / [`quote_single`].
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Extract the unescaped body from captures produced by [`STRING_LITERAL`], where
/// `first` is the index of its first group inside the enclosing pattern.
pub fn literal_body(caps: &regex::Captures<'_>, first: usize) -> Option<String> {
    caps.get(first)
        .or_else(|| caps.get(first + 1))
        .map(|m| unescape(m.as_str()))
}

/// Every string literal in `text`, in order of appearance.
pub fn all_literals(text: &str) -> Vec<String> {
    use once_cell::sync::Lazy;
    static LITERAL: Lazy<Regex> = Lazy::new(|| pattern(STRING_LITERAL));
    LITERAL
        .captures_iter(text)
        .filter_map(|caps| literal_body(&caps, 1))
        .collect()
}

/// Names bound by a `name = ...` assignment at the start of a line, in order of
/// first binding. Comparisons (`==`) are not bindings.
pub fn assigned_names(source: &str) -> Vec<String> {
    use once_cell::sync::Lazy;
    static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*([A-Za-z_]\w*)[ \t]*=(?:[^=]|$)"));
    let mut names: Vec<String> = Vec::new();
    for caps in ASSIGNMENT.captures_iter(source) {
        let name = &caps[1];
        if !KEYWORDS.contains(&name) && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Percent (integer) to the two-decimal fraction used in generated code: `80` → `0.80`.
pub fn percent_to_fraction(percent: u32) -> String {
    format!("{}.{:02}", percent / 100, percent % 100)
}

/// A decimal fraction as written in source back to a whole percent, rounding half up.
///
/// Works on the decimal digits directly so `0.805` is exactly 80.5 and becomes 81.
pub fn fraction_to_percent(text: &str) -> Option<u32> {
    let text = text.trim();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    let whole: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut digits = frac_part.bytes().map(|b| u64::from(b - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let thousandths = digits.next().unwrap_or(0);

    let mut percent = whole.checked_mul(100)? + tenths * 10 + hundredths;
    if thousandths >= 5 {
        percent += 1;
    }
    u32::try_from(percent).ok()
}
