//! Lexical extractors for the three tool-call envelopes.
//!
//! Each envelope is an independent scan over the same input. Priority is
//! Primary > Inline > Legacy: a lower-priority match whose span overlaps an
//! already-claimed region is discarded. Accepted commands claim their spans;
//! rejected candidates (unknown tool, oversized or malformed parameters) do
//! not, so their text stays in the residual and reads as narrative.
//!
//! Delimiter tokens are the wire format between the model and this parser.
//! Do not change them without a matching prompt change:
//!
//! - Primary: `<tool_call><name>NAME</name><params>JSON</params></tool_call>`
//! - Inline:  `<tool:NAME>JSON</tool:NAME>`
//! - Legacy:  `[TOOL_CALL:NAME] body [/TOOL_CALL]`

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParsedCommand, ToolCatalog};
use crate::config::schema::ParserConfig;
use crate::errors::ParseDefect;
use crate::parser::json_repair::repair_json_object;

// Tool names are bounded to 64 chars inside every pattern so a pathological
// input cannot force long backtracking runs.
static PRIMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<tool_call>\s*<name>\s*([A-Za-z0-9_\-]{1,64})\s*</name>\s*<params>(.*?)</params>\s*</tool_call>",
    )
    .expect("invalid primary envelope regex")
});

static INLINE_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<tool:([A-Za-z0-9_\-]{1,64})>").expect("invalid inline open regex"));

static LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\[TOOL_CALL:([A-Za-z0-9_\-]{1,64})\](.*?)\[/TOOL_CALL\]")
        .expect("invalid legacy envelope regex")
});

/// A command occurrence found by one extractor, before acceptance checks.
struct Candidate<'a> {
    name: &'a str,
    params: &'a str,
    span: (usize, usize),
}

/// Run all three extractors over `text`, resolving overlaps by priority and
/// restoring document order at the end.
///
/// Returns accepted commands; every rejection is recorded in `diagnostics`.
pub(super) fn extract_commands(
    text: &str,
    catalog: &dyn ToolCatalog,
    config: &ParserConfig,
    diagnostics: &mut Vec<String>,
) -> Vec<ParsedCommand> {
    let mut commands: Vec<ParsedCommand> = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut cap_hit = false;

    for candidate in scan_primary(text)
        .into_iter()
        .chain(scan_inline(text))
        .chain(scan_legacy(text))
    {
        if overlaps_any(candidate.span, &claimed) {
            continue; // first-writer-wins by extractor priority
        }
        if commands.len() >= config.max_tool_calls {
            cap_hit = true;
            break;
        }
        if let Some(cmd) = accept(text, &candidate, catalog, config, diagnostics) {
            claimed.push(cmd.span);
            commands.push(cmd);
        }
    }

    if cap_hit {
        diagnostics.push(format!(
            "tool call cap reached ({}); further commands ignored",
            config.max_tool_calls
        ));
    }

    commands.sort_by_key(|c| c.span.0);
    commands
}

fn scan_primary(text: &str) -> Vec<Candidate<'_>> {
    PRIMARY_RE
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).expect("match always has group 0");
            Candidate {
                name: caps.get(1).map_or("", |m| m.as_str()),
                params: caps.get(2).map_or("", |m| m.as_str()),
                span: (whole.start(), whole.end()),
            }
        })
        .collect()
}

/// The inline closer must repeat the opener's tool name. The regex crate has
/// no backreferences, so the closer is located with a plain substring search.
fn scan_inline(text: &str) -> Vec<Candidate<'_>> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(caps) = INLINE_OPEN_RE.captures_at(text, from) {
        let open = caps.get(0).expect("match always has group 0");
        let name = caps.get(1).map_or("", |m| m.as_str());
        let closer = format!("</tool:{}>", name);
        match text[open.end()..].find(&closer) {
            Some(rel) => {
                let body_end = open.end() + rel;
                let end = body_end + closer.len();
                out.push(Candidate {
                    name,
                    params: &text[open.end()..body_end],
                    span: (open.start(), end),
                });
                from = end;
            }
            None => from = open.end(),
        }
    }
    out
}

fn scan_legacy(text: &str) -> Vec<Candidate<'_>> {
    LEGACY_RE
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).expect("match always has group 0");
            Candidate {
                name: caps.get(1).map_or("", |m| m.as_str()),
                params: caps.get(2).map_or("", |m| m.as_str()),
                span: (whole.start(), whole.end()),
            }
        })
        .collect()
}

/// Shape checks shared by every extractor: parameter size cap, known tool
/// name, argument repair, and the registry's per-tool argument validator.
fn accept(
    text: &str,
    candidate: &Candidate<'_>,
    catalog: &dyn ToolCatalog,
    config: &ParserConfig,
    diagnostics: &mut Vec<String>,
) -> Option<ParsedCommand> {
    if candidate.params.len() > config.max_params_chars {
        diagnostics.push(
            ParseDefect::OversizedParams {
                size: candidate.params.len(),
                limit: config.max_params_chars,
            }
            .to_string(),
        );
        return None;
    }
    if !catalog.contains(candidate.name) {
        diagnostics.push(ParseDefect::UnknownTool(candidate.name.to_string()).to_string());
        return None;
    }
    let arguments = match repair_json_object(candidate.params) {
        Ok(args) => args,
        Err(defect) => {
            diagnostics.push(format!("{} (tool '{}')", defect, candidate.name));
            return None;
        }
    };
    if let Err(msg) = catalog.validate_args(candidate.name, &arguments) {
        diagnostics.push(format!(
            "Rejected arguments for tool '{}': {}",
            candidate.name, msg
        ));
        return None;
    }
    Some(ParsedCommand {
        name: candidate.name.to_string(),
        arguments,
        span: candidate.span,
        raw_text: text[candidate.span.0..candidate.span.1].to_string(),
    })
}

fn overlaps_any(span: (usize, usize), claimed: &[(usize, usize)]) -> bool {
    claimed.iter().any(|&(s, e)| span.0 < e && s < span.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NameSetCatalog;

    fn catalog() -> NameSetCatalog {
        NameSetCatalog::new(["web_search", "edit_document", "a"])
    }

    fn extract(text: &str) -> (Vec<ParsedCommand>, Vec<String>) {
        let mut diags = Vec::new();
        let cmds = extract_commands(text, &catalog(), &ParserConfig::default(), &mut diags);
        (cmds, diags)
    }

    #[test]
    fn test_primary_envelope() {
        let (cmds, diags) = extract(
            r#"<tool_call><name>web_search</name><params>{"query": "x"}</params></tool_call>"#,
        );
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].name, "web_search");
        assert_eq!(cmds[0].arguments["query"], "x");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_inline_envelope() {
        let (cmds, _) = extract(r#"Before <tool:web_search>{"query": "y"}</tool:web_search> after"#);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].name, "web_search");
    }

    #[test]
    fn test_inline_closer_name_must_match() {
        let (cmds, _) = extract(r#"<tool:web_search>{"query": "y"}</tool:other>"#);
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_legacy_envelope_with_fence() {
        let (cmds, _) = extract(
            "[TOOL_CALL:edit_document]\n```json\n{\"path\": \"a.md\"}\n```\n[/TOOL_CALL]",
        );
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].arguments["path"], "a.md");
    }

    #[test]
    fn test_unknown_tool_dropped_with_diagnostic() {
        let (cmds, diags) =
            extract(r#"<tool_call><name>bogus</name><params>{}</params></tool_call>"#);
        assert!(cmds.is_empty());
        assert!(diags.iter().any(|d| d.contains("Unknown tool")));
    }

    #[test]
    fn test_commands_sorted_by_document_order() {
        let text = format!(
            "{} middle {}",
            r#"<tool:a>{}</tool:a>"#,
            r#"<tool_call><name>web_search</name><params>{"query":"z"}</params></tool_call>"#
        );
        let (cmds, _) = extract(&text);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].span.0 < cmds[1].span.0);
        assert_eq!(cmds[0].name, "a");
    }

    #[test]
    fn test_overlapping_lower_priority_discarded() {
        // A primary envelope whose params body contains inline-looking markup:
        // the primary claims the whole span, the inline match inside is dropped.
        let text = r#"<tool_call><name>a</name><params>{"note": "<tool:a>{}</tool:a>"}</params></tool_call>"#;
        let (cmds, _) = extract(text);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].span, (0, text.len()));
    }

    #[test]
    fn test_command_cap_enforced() {
        let one = r#"<tool_call><name>a</name><params>{}</params></tool_call>"#;
        let text = one.repeat(20);
        let mut diags = Vec::new();
        let config = ParserConfig {
            max_tool_calls: 3,
            ..ParserConfig::default()
        };
        let cmds = extract_commands(&text, &catalog(), &config, &mut diags);
        assert_eq!(cmds.len(), 3);
        assert!(diags.iter().any(|d| d.contains("cap reached")));
    }

    #[test]
    fn test_oversized_params_dropped() {
        let big = format!(r#"{{"pad": "{}"}}"#, "x".repeat(20_000));
        let text = format!("<tool_call><name>a</name><params>{}</params></tool_call>", big);
        let (cmds, diags) = extract(&text);
        assert!(cmds.is_empty());
        assert!(diags.iter().any(|d| d.contains("too large")));
    }

    #[test]
    fn test_spans_are_disjoint() {
        let text = r#"<tool:a>{}</tool:a><tool:a>{}</tool:a>"#;
        let (cmds, _) = extract(text);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].span.1 <= cmds[1].span.0);
    }
}
