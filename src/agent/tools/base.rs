//! Base trait for agent tools.
//!
//! Tool *semantics* live outside this crate; the core only needs a name, an
//! argument-shape check, and an execution entry point with a structured
//! outcome.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Structured outcome for a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub ok: bool,
    /// Rendered output on success, `Error: …` text on failure.
    pub data: String,
    pub error: Option<String>,
}

impl ToolExecutionResult {
    pub fn success(data: String) -> Self {
        Self {
            ok: true,
            data,
            error: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            ok: false,
            data: format!("Error: {}", message),
            error: Some(message),
        }
    }
}

/// Abstract base trait for agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as it appears in command envelopes.
    fn name(&self) -> &str;

    /// Description of what the tool does.
    fn description(&self) -> &str;

    /// Shape-check arguments before execution. The default accepts anything;
    /// tools with required parameters override this.
    fn validate_args(&self, _args: &HashMap<String, Value>) -> Result<(), String> {
        Ok(())
    }

    /// Execute the tool with given arguments.
    async fn execute(&self, args: HashMap<String, Value>) -> ToolExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_error_prefix() {
        let r = ToolExecutionResult::failure("file not found".into());
        assert!(!r.ok);
        assert_eq!(r.data, "Error: file not found");
        assert_eq!(r.error.as_deref(), Some("file not found"));
    }

    #[test]
    fn test_success_has_no_error() {
        let r = ToolExecutionResult::success("done".into());
        assert!(r.ok);
        assert!(r.error.is_none());
    }
}
