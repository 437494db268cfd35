//! Retry policy: decides backoff delays.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::config::RetryConfig;

/// Computed delays saturate here; `multiplier^(n-1)` overflows to
/// infinity long before any sane schedule, and `from_secs_f64` panics
/// on non-finite input.
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Exponential backoff for failed jobs.
///
/// Deterministic on purpose - no jitter - so retry timing is exactly
/// predictable in tests and in operator head-math alike.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier applied per additional retry.
    pub multiplier: f64,

    /// Failures allowed before a job fails permanently.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            multiplier: config.backoff_multiplier,
            max_retries: config.max_retries,
        }
    }

    /// Delay before the attempt numbered `retry_count`.
    ///
    /// `retry_count` is the post-increment value, so the first retry
    /// (`retry_count = 1`) uses exponent 0:
    /// `delay = base_delay * multiplier^(retry_count - 1)`.
    ///
    /// With the defaults (5s base, x2): 5s, 10s, 20s for retries 1..=3.
    /// Keep the exponent as-is; shifting it changes observable timing.
    /// Saturates at [`MAX_DELAY`].
    pub fn delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        if secs.is_finite() && secs < MAX_DELAY.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            MAX_DELAY
        }
    }

    /// Absolute due time for the attempt numbered `retry_count`.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delay = self.delay(retry_count);
        now + TimeDelta::milliseconds(delay.as_millis() as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
