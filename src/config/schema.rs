//! Configuration schema for plumebot.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so that the JSON
//! config file can use camelCase keys while Rust code uses snake_case fields.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parser limits
// ---------------------------------------------------------------------------

/// Hard caps applied during tool-call extraction.
///
/// Exceeding any cap is a diagnosable, non-fatal condition — excess input is
/// truncated, oversized candidates are dropped, extra commands are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserConfig {
    /// Total input length cap; excess is truncated before extraction.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Per-command parameter-block length cap.
    #[serde(default = "default_max_params_chars")]
    pub max_params_chars: usize,
    /// Total accepted commands per parse.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,
    /// Minimum unterminated-block content before truncation recovery runs.
    #[serde(default = "default_min_partial_chars")]
    pub min_partial_chars: usize,
}

fn default_max_input_chars() -> usize {
    100_000
}

fn default_max_params_chars() -> usize {
    10_000
}

fn default_max_tool_calls() -> usize {
    8
}

fn default_min_partial_chars() -> usize {
    24
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            max_params_chars: default_max_params_chars(),
            max_tool_calls: default_max_tool_calls(),
            min_partial_chars: default_min_partial_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loop config
// ---------------------------------------------------------------------------

/// Iteration controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Hard bound on model calls per session.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Attempts per tool before switching to an alternative-tool nudge.
    #[serde(default = "default_tool_max_attempts")]
    pub tool_max_attempts: u32,
    /// Identical tool+args calls tolerated within one session.
    #[serde(default = "default_max_same_call")]
    pub max_same_call: u32,
    /// Tool output is truncated to this many chars before entering context.
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_tool_max_attempts() -> u32 {
    3
}

fn default_max_same_call() -> u32 {
    2
}

fn default_max_tool_result_chars() -> usize {
    30_000
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_max_attempts: default_tool_max_attempts(),
            max_same_call: default_max_same_call(),
            max_tool_result_chars: default_max_tool_result_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery policy
// ---------------------------------------------------------------------------

/// Inputs to the recovery-strategy decision table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPolicy {
    /// Floor for timeout partial output. A partial is considered substantial
    /// (worth surfacing instead of retrying) only when its length is at
    /// least twice this floor — a fragment barely over the floor is retried.
    #[serde(default = "default_partial_floor_chars")]
    pub partial_floor_chars: usize,
}

fn default_partial_floor_chars() -> usize {
    100
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            partial_floor_chars: default_partial_floor_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Per-tool circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker trips.
    #[serde(default = "default_breaker_threshold")]
    pub threshold: u32,
    /// Seconds before a tripped breaker allows another attempt.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_breaker_cooldown_secs() -> u64 {
    300
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_breaker_threshold(),
            cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub agent: LoopConfig,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}
