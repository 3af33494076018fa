//! Terminal-response cleanup.
//!
//! Residual text that becomes the user-visible response may still carry
//! leaked envelope fragments or stray markup from a confused model. This
//! strips them and collapses the whitespace left behind.
//!
//! Safety guarantee: never produces empty output from non-empty input.

use once_cell::sync::Lazy;
use regex::Regex;

// Lowercase XML-ish tags: <tool_call>, </params>, <final_response>, etc.
static MARKUP_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-z_][a-z0-9_:]*>").expect("invalid markup tag regex"));

// Orphaned legacy markers.
static LEGACY_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[/?TOOL_CALL(?::[A-Za-z0-9_\-]{1,64})?\]").expect("invalid legacy marker regex")
});

// Three or more consecutive blank lines.
static EXCESS_BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("invalid blank line regex"));

/// Strip leaked markup from a terminal response.
pub fn strip_markup(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned = MARKUP_TAG_RE.replace_all(text, " ");
    let cleaned = LEGACY_MARKER_RE.replace_all(&cleaned, " ");
    let cleaned = EXCESS_BLANK_RE.replace_all(&cleaned, "\n\n");
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() {
        text.trim().to_string()
    } else {
        cleaned
    }
}

/// Truncate a tool result for context injection, marking the cut.
pub fn truncate_result(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n… [output truncated at {} chars]", &text[..end], max_chars)
}
