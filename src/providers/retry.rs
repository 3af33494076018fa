//! Shared retry helpers for model and tool calls.
//!
//! Provides backoff configurations and a rate-limit-aware delay adjuster
//! for use with `backon::Retryable`. The retry *policy* is selected by the
//! recovery table; these helpers only execute it.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::errors::ProviderError;

/// Standard backoff for model completions: 1s → 2s → 4s … capped at 30s,
/// 3 retries, with jitter.
pub fn model_backoff() -> ExponentialBuilder {
    ExponentialBuilder::new()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(30))
        .with_factor(2.0)
        .with_jitter()
        .with_max_times(3)
}

/// Tool-retry backoff: shorter, 500ms → 1s → 2s, 2 retries, with jitter.
pub fn tool_backoff() -> ExponentialBuilder {
    ExponentialBuilder::new()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(2))
        .with_factor(2.0)
        .with_jitter()
        .with_max_times(2)
}

/// If the error is `RateLimited`, ensure the delay is at least `retry_after_ms`.
///
/// Signature matches `backon::Retry::adjust`: returning `None` aborts the retry.
pub fn adjust_for_rate_limit(err: &anyhow::Error, dur: Option<Duration>) -> Option<Duration> {
    match (err.downcast_ref::<ProviderError>(), dur) {
        (Some(ProviderError::RateLimited { retry_after_ms, .. }), Some(d)) => {
            let rate_limit_delay = Duration::from_millis(*retry_after_ms);
            Some(d.max(rate_limit_delay))
        }
        (_, dur) => dur,
    }
}
