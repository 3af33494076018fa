//! Best-effort coercion of near-JSON parameter blocks into valid JSON.
//!
//! Models emit parameter blocks with Python-style quoting, trailing commas,
//! or bare identifiers. Each repair strategy is applied to the *original*
//! cleaned string independently and the first successful parse wins — no
//! cumulative rewriting, so a bad heuristic can never compound another.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::errors::ParseDefect;

// Trailing commas before a closing brace/bracket: {"a": 1,} or [1, 2,].
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("invalid trailing comma regex"));

// Bare object keys: { key: ... } or , key: ...
static BARE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("invalid bare key regex")
});

// Unquoted scalar values: ": word" followed by a delimiter.
static BARE_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#":\s*([A-Za-z_][A-Za-z0-9_./\-]*)\s*([,}\]])"#)
        .expect("invalid bare value regex")
});

/// Parse a string intended to encode a JSON object, repairing common
/// malformations. Fails with [`ParseDefect::MalformedArguments`] only after
/// every strategy is exhausted.
pub fn repair_json_object(raw: &str) -> Result<HashMap<String, Value>, ParseDefect> {
    let cleaned = strip_code_fence(raw.trim());

    // Strategies in order; each applies to `cleaned`, not to a prior rewrite.
    if let Some(obj) = try_parse_object(cleaned) {
        return Ok(obj);
    }
    if let Some(obj) = try_parse_object(&cleaned.replace('\'', "\"")) {
        return Ok(obj);
    }
    if let Some(obj) = try_parse_object(&TRAILING_COMMA_RE.replace_all(cleaned, "$1")) {
        return Ok(obj);
    }
    if let Some(obj) = try_parse_object(&BARE_KEY_RE.replace_all(cleaned, "$1\"$2\":")) {
        return Ok(obj);
    }
    if let Some(obj) = try_parse_object(&quote_bare_values(cleaned)) {
        return Ok(obj);
    }

    Err(ParseDefect::MalformedArguments(preview(cleaned)))
}

/// Strip one surrounding fenced-code delimiter (```json ... ```), if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence's line.
    match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            rest[nl + 1..].trim()
        }
        _ => rest.trim(),
    }
}

fn try_parse_object(text: &str) -> Option<HashMap<String, Value>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;
    Some(obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Quote bare scalar values, leaving numeric/boolean/null literals intact.
fn quote_bare_values(text: &str) -> String {
    BARE_VALUE_RE
        .replace_all(text, |caps: &Captures| {
            let word = &caps[1];
            let delim = &caps[2];
            if matches!(word, "true" | "false" | "null") || word.parse::<f64>().is_ok() {
                format!(": {}{}", word, delim)
            } else {
                format!(": \"{}\"{}", word, delim)
            }
        })
        .into_owned()
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}
