//! Tool registry for dynamic tool management.
//!
//! The registry is both the executor and the parser's catalog: it supplies
//! the closed set of valid tool identifiers and each tool's argument-shape
//! validator.

use std::collections::HashMap;

use serde_json::Value;

use super::base::{Tool, ToolExecutionResult};
use crate::parser::ToolCatalog;

/// Registry for agent tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Execute a tool by name with given arguments.
    ///
    /// Returns a structured outcome so callers can reason about
    /// success/failure without parsing raw strings. Catches panics so a
    /// single tool failure doesn't crash the agent loop.
    pub async fn execute(
        &self,
        name: &str,
        args: HashMap<String, Value>,
    ) -> ToolExecutionResult {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                return ToolExecutionResult::failure(format!("Tool '{}' not found", name));
            }
        };

        let fut = std::panic::AssertUnwindSafe(tool.execute(args));
        match futures_util::FutureExt::catch_unwind(fut).await {
            Ok(result) => result,
            Err(_) => {
                ToolExecutionResult::failure(format!("Tool '{}' panicked during execution", name))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog for ToolRegistry {
    fn contains(&self, name: &str) -> bool {
        self.has(name)
    }

    fn validate_args(&self, name: &str, args: &HashMap<String, Value>) -> Result<(), String> {
        match self.tools.get(name) {
            Some(tool) => tool.validate_args(args),
            None => Err(format!("Tool '{}' not found", name)),
        }
    }
}
