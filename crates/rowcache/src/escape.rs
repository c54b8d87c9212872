//! SQL escaping and template substitution primitives.
//!
//! Everything in this module is a pure function over [`serde_json::Value`].
//! Values are rendered as inline SQL literals (MySQL dialect), identifiers
//! are backtick-quoted, and the two template forms replace positional
//! (`?`/`??`) and named (`:name`/`::name`) tokens.

use crate::Row;
use serde_json::Value;

/// Render a value as a SQL literal safe for direct interpolation.
///
/// - `null` → `NULL`
/// - booleans → `true` / `false`
/// - numbers → decimal text
/// - strings → single-quoted with backslash escapes
/// - arrays → comma-separated escaped elements (for `IN (...)` lists)
/// - objects → their JSON text, escaped as a string literal
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_string(s),
        Value::Array(items) => items
            .iter()
            .map(escape_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => escape_string(&value.to_string()),
    }
}

/// Quote a string literal, escaping every character that could terminate or
/// re-open the quote. Quote characters are escaped, never stripped.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier (table/column name), doubling embedded backticks.
///
/// Dotted names are quoted per part: `db.users` → `` `db`.`users` ``.
pub fn escape_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for (i, part) in name.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push('`');
        for ch in part.chars() {
            if ch == '`' {
                out.push_str("``");
            } else {
                out.push(ch);
            }
        }
        out.push('`');
    }
    out
}

/// Textual rendering of a value for non-literal contexts (identifier tokens,
/// cache-key segments, unescaped substitution). Strings stay bare.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace positional tokens in a template: `??` consumes the next value as
/// an identifier, `?` as an escaped literal. Tokens beyond the supplied
/// values are left verbatim.
pub fn format_template(template: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut vals = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        let ident = chars.peek() == Some(&'?');
        if ident {
            chars.next();
        }
        match vals.next() {
            Some(value) if ident => out.push_str(&escape_id(&value_text(value))),
            Some(value) => out.push_str(&escape_value(value)),
            None => out.push_str(if ident { "??" } else { "?" }),
        }
    }
    out
}

/// Replace named tokens in a template: `:name` substitutes the escaped value
/// under `name`, `::name` the escaped identifier. Token names may contain
/// word characters and `$`. Names absent from `params` are left verbatim,
/// which allows a template to be resolved in multiple passes.
///
/// With `disable_escape` the raw value text is inserted unchanged; this mode
/// exists only for internally computed SQL fragments (a pre-built LIMIT
/// clause, the escaped table name) and must never see caller values.
pub fn format_named_template(template: &str, params: &Row, disable_escape: bool) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b':' {
            // Safe to index by bytes: ASCII ':' never splits a UTF-8 sequence.
            let start = i;
            while i < bytes.len() && bytes[i] != b':' {
                i += 1;
            }
            out.push_str(&template[start..i]);
            continue;
        }
        let ident = i + 1 < bytes.len() && bytes[i + 1] == b':';
        let name_start = if ident { i + 2 } else { i + 1 };
        let mut name_end = name_start;
        while name_end < bytes.len() && is_token_byte(bytes[name_end]) {
            name_end += 1;
        }
        if name_end == name_start {
            // Bare ':' (or '::') with no token name.
            out.push_str(&template[i..name_start]);
            i = name_start;
            continue;
        }
        let name = &template[name_start..name_end];
        match params.get(name) {
            Some(value) if disable_escape => out.push_str(&value_text(value)),
            Some(value) if ident => out.push_str(&escape_id(&value_text(value))),
            Some(value) => out.push_str(&escape_value(value)),
            None => out.push_str(&template[i..name_end]),
        }
        i = name_end;
    }
    out
}

fn is_token_byte(b: u8) -> bool {
    b == b'$' || b == b'_' || b.is_ascii_alphanumeric()
}

/// Join SQL segments with single spaces, dropping blank segments.
pub(crate) fn join_sql(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
