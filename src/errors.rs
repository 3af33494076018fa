//! Domain error types for plumebot.
//!
//! Typed errors at module boundaries replace string-encoded errors and
//! enable structured error handling via pattern matching. Iteration-level
//! errors feed the recovery-strategy selector; parse-level defects never
//! leave the parser except as diagnostics.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Errors from model-client operations.
///
/// Embedded in `anyhow::Error` so the `ModelClient` trait signature
/// (`-> anyhow::Result<String>`) stays unchanged while callers can
/// downcast: `e.downcast_ref::<ProviderError>()`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Completion timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        elapsed_ms: u64,
        limit_ms: u64,
        /// Whatever text arrived before the stream was cut off.
        partial_output: Option<String>,
    },

    #[error("Rate limited (status {status}): retry after {retry_after_ms}ms")]
    RateLimited { status: u16, retry_after_ms: u64 },

    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Parse defects
// ---------------------------------------------------------------------------

/// Parse-local failures. These are always recovered inside the parser —
/// the offending candidate is dropped with a diagnostic and the text is
/// left in the residual. They never abort a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDefect {
    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Parameter block too large: {size} chars (limit {limit})")]
    OversizedParams { size: usize, limit: usize },

    #[error("Input truncated to {limit} chars")]
    InputTruncated { limit: usize },
}

// ---------------------------------------------------------------------------
// Iteration-level errors
// ---------------------------------------------------------------------------

/// Structured error surfaced to the recovery-strategy selector.
///
/// Created at the failure site, consumed once by
/// [`crate::agent::recovery::select_strategy`], never retained.
#[derive(Debug, Clone)]
pub enum AgentError {
    /// The model call (or a tool) exceeded its caller-supplied deadline.
    Timeout {
        elapsed_ms: u64,
        limit_ms: u64,
        partial_output: Option<String>,
    },
    /// A tool executed and reported failure.
    ToolFailure {
        tool: String,
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    /// The upstream model service rejected the request.
    Upstream { status: u16, message: String },
    /// The circuit breaker for a tool is open.
    CircuitOpen {
        tool: String,
        failure_count: u32,
        threshold: u32,
    },
}

impl AgentError {
    /// Derived recoverability — not independently settable.
    ///
    /// Timeout is recoverable only if partial output exists; ToolFailure
    /// only while attempts remain; CircuitOpen never.
    pub fn recoverable(&self) -> bool {
        match self {
            AgentError::Timeout { partial_output, .. } => {
                partial_output.as_deref().is_some_and(|p| !p.is_empty())
            }
            AgentError::ToolFailure {
                attempt,
                max_attempts,
                ..
            } => attempt < max_attempts,
            AgentError::Upstream { status, .. } => *status == 429,
            AgentError::CircuitOpen { .. } => false,
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Timeout {
                elapsed_ms,
                limit_ms,
                ..
            } => write!(f, "timed out after {}ms (limit {}ms)", elapsed_ms, limit_ms),
            AgentError::ToolFailure {
                tool,
                attempt,
                max_attempts,
                message,
            } => write!(
                f,
                "tool '{}' failed (attempt {}/{}): {}",
                tool, attempt, max_attempts, message
            ),
            AgentError::Upstream { status, message } => {
                write!(f, "upstream error (status {}): {}", status, message)
            }
            AgentError::CircuitOpen {
                tool,
                failure_count,
                threshold,
            } => write!(
                f,
                "circuit open for '{}' ({} failures, threshold {})",
                tool, failure_count, threshold
            ),
        }
    }
}

impl std::error::Error for AgentError {}

/// Map a provider-layer error into the iteration-level taxonomy.
pub fn agent_error_from_provider(err: &ProviderError) -> AgentError {
    match err {
        ProviderError::Timeout {
            elapsed_ms,
            limit_ms,
            partial_output,
        } => AgentError::Timeout {
            elapsed_ms: *elapsed_ms,
            limit_ms: *limit_ms,
            partial_output: partial_output.clone(),
        },
        ProviderError::RateLimited { status, .. } => AgentError::Upstream {
            status: *status,
            message: "rate limited".to_string(),
        },
        ProviderError::ServerError { status, message } => AgentError::Upstream {
            status: *status,
            message: message.clone(),
        },
        ProviderError::HttpError(msg) => AgentError::Upstream {
            status: 0,
            message: msg.clone(),
        },
        ProviderError::Cancelled => AgentError::Upstream {
            status: 0,
            message: "request cancelled".to_string(),
        },
    }
}
