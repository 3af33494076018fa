//! Cheap structural lint for tool-call markup, independent of the parser.
//!
//! Intended for pre-submission diagnostics and telemetry — a fast signal
//! about whether output looks parseable, never a correctness-critical input.

use once_cell::sync::Lazy;
use regex::Regex;

static PARAMS_BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<params>(.*?)</params>").expect("invalid params body regex"));

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*[}\]]").expect("invalid trailing comma regex"));

/// Advisory lint result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickCheck {
    /// Best-effort tool count: `min(opens, closes)`.
    pub tool_count: usize,
    pub issues: Vec<String>,
}

/// Count envelope markers and flag obvious JSON defects in parameter bodies.
pub fn quick_validate(text: &str) -> QuickCheck {
    let opens = text.matches("<tool_call>").count();
    let closes = text.matches("</tool_call>").count();

    let mut issues = Vec::new();
    if opens != closes {
        issues.push(format!(
            "mismatched tool_call markers: {} opening, {} closing",
            opens, closes
        ));
    }

    for (i, caps) in PARAMS_BODY_RE.captures_iter(text).enumerate() {
        let body = caps.get(1).map_or("", |m| m.as_str());
        if body.contains('\'') && !body.contains('"') {
            issues.push(format!(
                "params block {} uses single quotes only (likely invalid JSON)",
                i + 1
            ));
        }
        if TRAILING_COMMA_RE.is_match(body) {
            issues.push(format!("params block {} has a trailing comma", i + 1));
        }
    }

    QuickCheck {
        tool_count: opens.min(closes),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_no_issues() {
        let qc = quick_validate("nothing structured here");
        assert_eq!(qc.tool_count, 0);
        assert!(qc.issues.is_empty());
    }

    #[test]
    fn test_counts_balanced_markers() {
        let one = r#"<tool_call><name>a</name><params>{}</params></tool_call>"#;
        let qc = quick_validate(&one.repeat(3));
        assert_eq!(qc.tool_count, 3);
        assert!(qc.issues.is_empty());
    }

    #[test]
    fn test_flags_unbalanced_markers() {
        let qc = quick_validate("<tool_call><name>a</name><params>{}</params>");
        assert_eq!(qc.tool_count, 0);
        assert!(qc.issues[0].contains("mismatched"));
    }

    #[test]
    fn test_flags_single_quote_params() {
        let qc = quick_validate(
            "<tool_call><name>a</name><params>{'k': 'v'}</params></tool_call>",
        );
        assert!(qc.issues.iter().any(|i| i.contains("single quotes")));
    }

    #[test]
    fn test_flags_trailing_comma() {
        let qc = quick_validate(
            r#"<tool_call><name>a</name><params>{"k": 1,}</params></tool_call>"#,
        );
        assert!(qc.issues.iter().any(|i| i.contains("trailing comma")));
    }
}
