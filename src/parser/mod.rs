//! Tool-call protocol parser.
//!
//! The single entry point is [`ToolCallParser::parse`], which converts one
//! raw model completion into an ordered list of validated commands plus the
//! residual natural-language text. Parsing is pure and side-effect-free:
//! the parser holds only configuration and a handle to the tool catalog, so
//! it is safe to share across concurrent sessions.

pub mod extract;
pub mod json_repair;
pub mod partial;
pub mod quick_check;

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::config::schema::ParserConfig;
use crate::errors::ParseDefect;

/// A validated tool invocation extracted from model output.
///
/// `span` holds byte offsets into the input this command was parsed from;
/// spans never overlap across the commands of one parse.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub name: String,
    pub arguments: HashMap<String, Value>,
    pub span: (usize, usize),
    pub raw_text: String,
}

/// Result of parsing one model completion.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The input with every claimed command span removed, in order.
    pub residual_text: String,
    /// Accepted commands in document order.
    pub commands: Vec<ParsedCommand>,
    /// False only when a fatal input condition occurred and nothing was
    /// extracted. Zero commands on well-formed input is still a success.
    pub succeeded: bool,
    /// Human-readable notes from every stage: dropped candidates, caps hit,
    /// truncation recovery.
    pub diagnostics: Vec<String>,
}

/// The closed set of known tool identifiers plus per-tool argument-shape
/// validation, supplied by the tool registry.
pub trait ToolCatalog: Send + Sync {
    fn contains(&self, name: &str) -> bool;

    /// Shape-check arguments for a known tool. The default accepts anything.
    fn validate_args(&self, _name: &str, _args: &HashMap<String, Value>) -> Result<(), String> {
        Ok(())
    }
}

impl<T: ToolCatalog + ?Sized> ToolCatalog for std::sync::Arc<T> {
    fn contains(&self, name: &str) -> bool {
        (**self).contains(name)
    }

    fn validate_args(&self, name: &str, args: &HashMap<String, Value>) -> Result<(), String> {
        (**self).validate_args(name, args)
    }
}

/// A catalog backed by a plain name set, with no argument validation.
pub struct NameSetCatalog {
    names: HashSet<String>,
}

impl NameSetCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolCatalog for NameSetCatalog {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Multi-format tool-call parser. See the module docs for the envelope
/// grammar and [`ParserConfig`] for the safety caps.
pub struct ToolCallParser<C: ToolCatalog> {
    catalog: C,
    config: ParserConfig,
}

impl<C: ToolCatalog> ToolCallParser<C> {
    pub fn new(catalog: C, config: ParserConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Parse one raw model completion.
    ///
    /// Applies the input-length cap, runs the three extractors, falls back
    /// to truncation recovery when nothing was extracted, and computes the
    /// residual text from the claimed spans.
    pub fn parse(&self, raw: &str) -> ParseOutcome {
        let mut diagnostics = Vec::new();

        let truncated = raw.len() > self.config.max_input_chars;
        let text = if truncated {
            diagnostics.push(
                ParseDefect::InputTruncated {
                    limit: self.config.max_input_chars,
                }
                .to_string(),
            );
            truncate_at_char_boundary(raw, self.config.max_input_chars)
        } else {
            raw
        };

        let mut commands =
            extract::extract_commands(text, &self.catalog, &self.config, &mut diagnostics);

        if commands.is_empty() && !text.is_empty() {
            if let Some(recovered) =
                partial::recover_truncated(text, &self.catalog, &self.config, &mut diagnostics)
            {
                commands.push(recovered);
            }
        }

        let residual_text = remove_spans(text, commands.iter().map(|c| c.span));

        // A parse fails only when the size cap fired and nothing usable
        // came out of the truncated text.
        let succeeded = !(truncated && commands.is_empty());

        ParseOutcome {
            residual_text,
            commands,
            succeeded,
            diagnostics,
        }
    }
}

/// Remove claimed spans (given in ascending order) from `text`.
fn remove_spans(text: &str, spans: impl Iterator<Item = (usize, usize)>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        debug_assert!(start >= cursor, "spans must be ascending and disjoint");
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn truncate_at_char_boundary(text: &str, mut limit: usize) -> &str {
    while limit > 0 && !text.is_char_boundary(limit) {
        limit -= 1;
    }
    &text[..limit]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ToolCallParser<NameSetCatalog> {
        ToolCallParser::new(
            NameSetCatalog::new(["web_search", "edit_document", "a"]),
            ParserConfig::default(),
        )
    }

    #[test]
    fn test_plain_text_is_identity() {
        let p = parser();
        let text = "Just a normal answer with no commands in it.";
        let outcome = p.parse(text);
        assert!(outcome.succeeded);
        assert!(outcome.commands.is_empty());
        assert_eq!(outcome.residual_text, text);
    }

    #[test]
    fn test_single_quote_repair_example() {
        let p = parser();
        let outcome =
            p.parse("<tool_call><name>web_search</name><params>{'query': 'x'}</params></tool_call>");
        assert!(outcome.succeeded);
        assert_eq!(outcome.commands.len(), 1);
        assert_eq!(outcome.commands[0].name, "web_search");
        assert_eq!(outcome.commands[0].arguments["query"], "x");
        assert!(outcome.residual_text.is_empty());
    }

    #[test]
    fn test_residual_removes_only_claimed_spans() {
        let p = parser();
        let text = "intro <tool:a>{}</tool:a> outro";
        let outcome = p.parse(text);
        assert_eq!(outcome.residual_text, "intro  outro");
    }

    #[test]
    fn test_unknown_tool_remains_in_residual() {
        let p = parser();
        let text = "<tool_call><name>bogus</name><params>{}</params></tool_call>";
        let outcome = p.parse(text);
        assert!(outcome.succeeded);
        assert!(outcome.commands.is_empty());
        assert_eq!(outcome.residual_text, text);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_round_trip_reconstruction() {
        let p = parser();
        let text = "a <tool:a>{}</tool:a> b <tool:a>{\"k\": 1}</tool:a> c";
        let outcome = p.parse(text);
        let mut rebuilt = outcome.residual_text.clone();
        // Re-insert each command's raw text at its original span, in order.
        for cmd in &outcome.commands {
            rebuilt.insert_str(cmd.span.0, &cmd.raw_text);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_input_cap_with_no_commands_fails() {
        let catalog = NameSetCatalog::new(["a"]);
        let config = ParserConfig {
            max_input_chars: 64,
            ..ParserConfig::default()
        };
        let p = ToolCallParser::new(catalog, config);
        let outcome = p.parse(&"x".repeat(1000));
        assert!(!outcome.succeeded);
        assert!(outcome.diagnostics.iter().any(|d| d.contains("truncated")));
    }

    #[test]
    fn test_input_cap_with_commands_succeeds() {
        let catalog = NameSetCatalog::new(["a"]);
        let config = ParserConfig {
            max_input_chars: 80,
            ..ParserConfig::default()
        };
        let p = ToolCallParser::new(catalog, config);
        let text = format!("<tool:a>{{}}</tool:a>{}", "y".repeat(500));
        let outcome = p.parse(&text);
        assert!(outcome.succeeded);
        assert_eq!(outcome.commands.len(), 1);
    }

    #[test]
    fn test_truncation_never_splits_multibyte_char() {
        let catalog = NameSetCatalog::new(["a"]);
        let config = ParserConfig {
            max_input_chars: 10,
            ..ParserConfig::default()
        };
        let p = ToolCallParser::new(catalog, config);
        // Must not panic on a boundary inside a multi-byte char.
        let outcome = p.parse(&"é".repeat(40));
        assert!(!outcome.succeeded);
    }

    #[test]
    fn test_two_commands_in_document_order() {
        let p = parser();
        let one = "<tool_call><name>a</name><params>{}</params></tool_call>";
        let outcome = p.parse(&format!("{}{}", one, one));
        assert_eq!(outcome.commands.len(), 2);
        assert_eq!(outcome.commands[0].name, "a");
        assert_eq!(outcome.commands[1].name, "a");
        assert!(outcome.commands[0].span.1 <= outcome.commands[1].span.0);
        assert!(outcome.residual_text.is_empty());
    }
}
