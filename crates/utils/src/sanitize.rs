//! Request-body sanitization: markup escaping and operator-key stripping.

use serde_json::Value;

/// Escape characters that carry meaning in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Keys that look like query operators (`$where`) or dotted paths (`a.b`).
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// First sanitization pass, run before validation.
///
/// Object keys that look like operators are removed at every level and string
/// values are trimmed, except those stored directly under one of `raw_fields`.
pub fn normalize_value(value: &mut Value, raw_fields: &[&str]) {
    visit_strings(value, raw_fields, false, &mut |s| {
        let trimmed = s.trim();
        if trimmed.len() != s.len() {
            *s = trimmed.to_string();
        }
    });
}

/// Second pass, run once the payload has passed validation, so length rules
/// count what the client typed rather than the escaped form.
pub fn escape_strings(value: &mut Value, raw_fields: &[&str]) {
    visit_strings(value, raw_fields, false, &mut |s| *s = escape_html(s));
}

fn visit_strings(
    value: &mut Value,
    raw_fields: &[&str],
    raw: bool,
    apply: &mut impl FnMut(&mut String),
) {
    match value {
        Value::String(s) if !raw => apply(s),
        Value::Array(items) => {
            for item in items {
                visit_strings(item, raw_fields, raw, apply);
            }
        }
        Value::Object(map) => {
            map.retain(|key, _| !is_operator_key(key));
            for (key, item) in map.iter_mut() {
                let raw = raw_fields.contains(&key.as_str());
                visit_strings(item, raw_fields, raw, apply);
            }
        }
        _ => {}
    }
}
