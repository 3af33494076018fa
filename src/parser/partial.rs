//! Recovery of a tool call cut off mid-stream.
//!
//! When an upstream timeout truncates output inside a `<params>` block, the
//! closing delimiters never arrive and the extractors see nothing. This pass
//! salvages that one in-flight command: it balances the unterminated JSON
//! structurally and hands the completed block to the repair normalizer.
//! Invoked only when a parse produced zero commands from non-empty input.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParsedCommand, ToolCatalog};
use crate::config::schema::ParserConfig;
use crate::parser::json_repair::repair_json_object;

/// Nesting deeper than this aborts recovery rather than generating an
/// arbitrarily long closer tail from adversarial input.
const MAX_COMPLETION_DEPTH: usize = 64;

// An opener with a name but no closing `</params>` anywhere after it.
static OPEN_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<tool_call>\s*<name>\s*([A-Za-z0-9_\-]{1,64})\s*</name>\s*<params>")
        .expect("invalid open call regex")
});

/// Attempt to salvage one truncated command running to end-of-input.
///
/// On success the command spans from its opening marker to end-of-input and
/// a truncation-recovery diagnostic is appended. Any failure yields `None`
/// and the caller falls back to plain text.
pub(super) fn recover_truncated(
    text: &str,
    catalog: &dyn ToolCatalog,
    config: &ParserConfig,
    diagnostics: &mut Vec<String>,
) -> Option<ParsedCommand> {
    // Take the last opener: earlier ones would have been matched by the
    // extractors if they were complete.
    let caps = OPEN_CALL_RE.captures_iter(text).last()?;
    let whole = caps.get(0).expect("match always has group 0");
    let name = caps.get(1).map_or("", |m| m.as_str());

    let body = &text[whole.end()..];
    if body.contains("</params>") {
        return None; // terminated after all — extraction already judged it
    }
    if body.trim().len() < config.min_partial_chars {
        return None; // too little content to call it a command
    }
    if body.len() > config.max_params_chars {
        return None;
    }

    let completed = complete_structure(body)?;
    let arguments = repair_json_object(&completed).ok()?;
    if !catalog.contains(name) {
        return None;
    }
    if catalog.validate_args(name, &arguments).is_err() {
        return None;
    }

    diagnostics.push(format!(
        "recovered truncated tool call '{}' at end of input",
        name
    ));
    Some(ParsedCommand {
        name: name.to_string(),
        arguments,
        span: (whole.start(), text.len()),
        raw_text: text[whole.start()..].to_string(),
    })
}

/// Append the closers an unterminated JSON fragment needs to balance.
///
/// Tracks brace/bracket nesting while ignoring characters inside string
/// literals (honoring backslash escapes). A trailing comma is trimmed before
/// closing. Mismatched closers or excessive depth abort the attempt.
fn complete_structure(body: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in body.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
            }
            _ => {}
        }
        if stack.len() > MAX_COMPLETION_DEPTH {
            return None;
        }
    }

    if stack.is_empty() && !in_string {
        // Nothing to complete; the body was already balanced.
        return Some(body.to_string());
    }

    let mut out = body.to_string();
    if in_string {
        out.push('"');
    }
    let trimmed = out.trim_end();
    let mut out = trimmed.strip_suffix(',').unwrap_or(trimmed).to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NameSetCatalog;

    fn recover(text: &str) -> (Option<ParsedCommand>, Vec<String>) {
        let catalog = NameSetCatalog::new(["web_search", "edit_document"]);
        let mut diags = Vec::new();
        let cmd = recover_truncated(text, &catalog, &ParserConfig::default(), &mut diags);
        (cmd, diags)
    }

    #[test]
    fn test_recovers_truncated_object() {
        let text = r#"Let me search. <tool_call><name>web_search</name><params>{"query": "rust parser combinators", "limit": 5"#;
        let (cmd, diags) = recover(text);
        let cmd = cmd.unwrap();
        assert_eq!(cmd.name, "web_search");
        assert_eq!(cmd.arguments["query"], "rust parser combinators");
        assert_eq!(cmd.arguments["limit"], 5);
        assert_eq!(cmd.span.1, text.len());
        assert!(diags[0].contains("recovered truncated"));
    }

    #[test]
    fn test_recovers_nested_structures() {
        let text = r#"<tool_call><name>edit_document</name><params>{"edits": [{"line": 1, "text": "one"}, {"line": 2"#;
        let (cmd, _) = recover(text);
        let cmd = cmd.unwrap();
        assert_eq!(cmd.arguments["edits"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_trailing_comma_trimmed() {
        let text = r#"<tool_call><name>web_search</name><params>{"query": "unterminated calls", "#;
        let (cmd, _) = recover(text);
        assert!(cmd.is_some());
    }

    #[test]
    fn test_unterminated_string_closed() {
        let text = r#"<tool_call><name>web_search</name><params>{"query": "cut off mid sent"#;
        let (cmd, _) = recover(text);
        assert_eq!(cmd.unwrap().arguments["query"], "cut off mid sent");
    }

    #[test]
    fn test_too_short_body_is_noise() {
        let text = r#"<tool_call><name>web_search</name><params>{"q""#;
        let (cmd, _) = recover(text);
        assert!(cmd.is_none());
    }

    #[test]
    fn test_unknown_tool_not_recovered() {
        let text = r#"<tool_call><name>bogus</name><params>{"query": "something long enough here"#;
        let catalog = NameSetCatalog::new(["web_search"]);
        let mut diags = Vec::new();
        assert!(recover_truncated(text, &catalog, &ParserConfig::default(), &mut diags).is_none());
    }

    #[test]
    fn test_mismatched_closer_aborts() {
        let text = r#"<tool_call><name>web_search</name><params>{"query": ["a", "b"}, "rest": 12345"#;
        let (cmd, _) = recover(text);
        assert!(cmd.is_none());
    }

    #[test]
    fn test_excessive_depth_aborts() {
        let body = "[".repeat(200);
        let text = format!(
            r#"<tool_call><name>web_search</name><params>{{"q": {}"#,
            body
        );
        let (cmd, _) = recover(&text);
        assert!(cmd.is_none());
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"<tool_call><name>web_search</name><params>{"query": "she said \"hello"#;
        let (cmd, _) = recover(text);
        assert_eq!(cmd.unwrap().arguments["query"], "she said \"hello");
    }
}
