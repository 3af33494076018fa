//! Base model-client interface.
//!
//! The completion service is an external collaborator: this crate only sees
//! a trait producing raw text. Timeouts belong to the implementation; the
//! core reacts to the [`crate::errors::ProviderError::Timeout`] it surfaces.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Which model tier to complete with. The fallback profile is requested by
/// the recovery selector after a rate-limit strategy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProfile {
    Primary,
    Fallback,
}

/// Abstract model client.
///
/// Implementations must be safe for concurrent use; independent agent
/// sessions share one client. Errors should embed
/// [`crate::errors::ProviderError`] so callers can downcast.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the accumulated conversation and return the raw completion text.
    ///
    /// `messages` are `{role, content}` objects in conversation order.
    async fn complete(&self, messages: &[Value], profile: ModelProfile) -> Result<String>;

    /// Model identifier for a profile (logging/telemetry only).
    fn model_name(&self, profile: ModelProfile) -> &str;
}

/// Build a `{role, content}` conversation message.
pub fn message(role: &str, content: &str) -> Value {
    json!({"role": role, "content": content})
}
