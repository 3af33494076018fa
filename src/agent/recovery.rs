//! Recovery-strategy selection for iteration-level failures.
//!
//! A pure decision table from [`AgentError`] to [`RecoveryStrategy`]. Policy
//! lives here; execution (backoff sleeps, fallback-model calls, skip notes)
//! belongs to the iteration controller.

use crate::config::schema::RecoveryPolicy;
use crate::errors::AgentError;

/// The fixed set of recovery actions the controller knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Re-attempt the failed call with exponential backoff.
    RetryWithBackoff,
    /// Stop and surface the partial output already received.
    AbortWithPartial,
    /// Stop retrying this tool; nudge the model toward another approach.
    TryAlternativeTool,
    /// Re-issue the completion on the cheaper fallback model.
    UseFallbackModel,
    /// Skip this command and let the loop continue.
    SkipAndContinue,
    /// Terminate the session with the fixed fallback response.
    GracefulDegrade,
}

/// Map a structured error to a recovery strategy. First matching rule wins.
///
/// A timeout's partial output counts as substantial only at twice the
/// configured floor — a fragment barely past the floor is retried rather
/// than surfaced as a half-finished answer.
pub fn select_strategy(error: &AgentError, policy: &RecoveryPolicy) -> RecoveryStrategy {
    match error {
        AgentError::Timeout { partial_output, .. } => {
            let partial_len = partial_output.as_deref().map_or(0, str::len);
            if partial_len >= policy.partial_floor_chars.saturating_mul(2) {
                RecoveryStrategy::AbortWithPartial
            } else {
                RecoveryStrategy::RetryWithBackoff
            }
        }
        AgentError::ToolFailure {
            attempt,
            max_attempts,
            ..
        } => {
            if attempt < max_attempts {
                RecoveryStrategy::RetryWithBackoff
            } else {
                RecoveryStrategy::TryAlternativeTool
            }
        }
        AgentError::Upstream { status, .. } => {
            if *status == 429 {
                RecoveryStrategy::UseFallbackModel
            } else {
                RecoveryStrategy::GracefulDegrade
            }
        }
        AgentError::CircuitOpen { .. } => RecoveryStrategy::SkipAndContinue,
    }
}
