//! Circuit breaker for tool health tracking.
//!
//! Tracks consecutive failures per tool name and marks tools as temporarily
//! unavailable after exceeding a failure threshold. After a cooldown period
//! the tool becomes available again for retry. An open breaker surfaces as
//! [`crate::errors::AgentError::CircuitOpen`] to the recovery selector.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::schema::CircuitBreakerConfig;

/// Per-tool health state.
struct ToolState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Tracks tool health and trips when failures exceed a threshold.
pub struct CircuitBreaker {
    states: HashMap<String, ToolState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker from config (defaults: 3 failures, 5 min cooldown).
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            states: HashMap::new(),
            threshold: config.threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }

    /// Create with custom threshold and cooldown.
    pub fn with_settings(threshold: u32, cooldown: Duration) -> Self {
        Self {
            states: HashMap::new(),
            threshold,
            cooldown,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Consecutive failures recorded for a tool.
    pub fn failure_count(&self, tool: &str) -> u32 {
        self.states
            .get(tool)
            .map_or(0, |s| s.consecutive_failures)
    }

    /// Check if a tool is available (not tripped or cooldown elapsed).
    pub fn is_available(&self, tool: &str) -> bool {
        let state = match self.states.get(tool) {
            Some(s) => s,
            None => return true, // never seen = available
        };

        if state.consecutive_failures < self.threshold {
            return true;
        }

        // Tripped — check if cooldown has elapsed.
        match state.last_failure {
            Some(t) => t.elapsed() >= self.cooldown,
            None => true,
        }
    }

    /// Record a successful call, resetting the failure counter.
    pub fn record_success(&mut self, tool: &str) {
        if let Some(state) = self.states.get_mut(tool) {
            state.consecutive_failures = 0;
            state.last_failure = None;
        }
    }

    /// Record a failed call, incrementing the failure counter.
    pub fn record_failure(&mut self, tool: &str) {
        let state = self.states.entry(tool.to_string()).or_insert(ToolState {
            consecutive_failures: 0,
            last_failure: None,
        });
        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(&CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tool_is_available() {
        let cb = CircuitBreaker::default();
        assert!(cb.is_available("web_search"));
    }

    #[test]
    fn test_record_failure_below_threshold() {
        let mut cb = CircuitBreaker::default();
        cb.record_failure("edit_document");
        cb.record_failure("edit_document");
        // 2 failures < threshold of 3, still available.
        assert!(cb.is_available("edit_document"));
    }

    #[test]
    fn test_record_failure_above_threshold_trips() {
        let mut cb = CircuitBreaker::default();
        for _ in 0..3 {
            cb.record_failure("edit_document");
        }
        assert!(!cb.is_available("edit_document"));
    }

    #[test]
    fn test_recovery_after_cooldown() {
        let mut cb = CircuitBreaker::with_settings(2, Duration::from_millis(10));
        cb.record_failure("flaky_tool");
        cb.record_failure("flaky_tool");
        assert!(!cb.is_available("flaky_tool"));

        // Wait for cooldown.
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.is_available("flaky_tool"));
    }

    #[test]
    fn test_record_success_resets() {
        let mut cb = CircuitBreaker::default();
        cb.record_failure("flaky_tool");
        cb.record_failure("flaky_tool");
        cb.record_success("flaky_tool");
        cb.record_failure("flaky_tool");
        cb.record_failure("flaky_tool");
        assert!(cb.is_available("flaky_tool")); // only 2 since last reset
    }

    #[test]
    fn test_independent_tools() {
        let mut cb = CircuitBreaker::default();
        for _ in 0..3 {
            cb.record_failure("bad_tool");
        }
        assert!(!cb.is_available("bad_tool"));
        assert!(cb.is_available("good_tool"));
    }
}
