//! Per-recipient rate limiting with whitelist/blacklist override.
//!
//! Two independent windows, hourly and daily. Each is a calendar bucket
//! (current hour, current day in UTC), not a sliding window: the
//! allowance resets at the bucket boundary, not N time-units after each
//! send. Counters live in the [`CounterStore`] and expire with their
//! bucket, so stale entries self-evict.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{FilterConfig, RateLimitConfig};
use crate::error::StoreError;
use crate::ports::{Clock, CounterStore};

const HOURLY_KEY_PREFIX: &str = "rate_limit:hourly:";
const DAILY_KEY_PREFIX: &str = "rate_limit:daily:";

/// Admission control per recipient.
///
/// Consulted at enqueue time (`is_allowed`) and updated at
/// successful-send time (`record_send`). Advisory abuse prevention,
/// not a security boundary.
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limits: RateLimitConfig,
    filter: FilterConfig,
}

impl RateLimiter {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        limits: RateLimitConfig,
        filter: FilterConfig,
    ) -> Self {
        Self {
            counters,
            clock,
            limits,
            filter,
        }
    }

    /// True iff both window counters are under their limits. A missing
    /// counter counts as zero.
    pub async fn is_allowed(&self, recipient: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();

        let hourly = self
            .counters
            .get(&hourly_key(recipient, now))
            .await?
            .unwrap_or(0);
        let daily = self
            .counters
            .get(&daily_key(recipient, now))
            .await?
            .unwrap_or(0);

        let allowed = hourly < self.limits.hourly_limit && daily < self.limits.daily_limit;
        if !allowed {
            tracing::warn!(
                recipient,
                hourly,
                hourly_limit = self.limits.hourly_limit,
                daily,
                daily_limit = self.limits.daily_limit,
                "rate limit exceeded"
            );
        }
        Ok(allowed)
    }

    /// Count one send against both windows. Each counter is created
    /// with an expiry at its bucket boundary.
    pub async fn record_send(&self, recipient: &str) -> Result<(), StoreError> {
        let now = self.clock.now();

        self.counters
            .incr(&hourly_key(recipient, now), hour_bucket_end(now))
            .await?;
        self.counters
            .incr(&daily_key(recipient, now), day_bucket_end(now))
            .await?;

        tracing::debug!(recipient, "recorded send against rate windows");
        Ok(())
    }

    /// True only if whitelist mode is on and the recipient's domain is
    /// whitelisted. Whitelisting bypasses counting, never the blacklist.
    pub fn is_whitelisted(&self, recipient: &str) -> bool {
        self.filter.whitelist_enabled
            && self
                .filter
                .whitelist_domains
                .contains(&extract_domain(recipient))
    }

    /// Blacklist applies regardless of whitelist mode.
    pub fn is_blacklisted(&self, recipient: &str) -> bool {
        self.filter
            .blacklist_domains
            .contains(&extract_domain(recipient))
    }

    /// Current counts and reset horizons, for operators.
    pub async fn status(&self, recipient: &str) -> Result<RateLimitStatus, StoreError> {
        let now = self.clock.now();

        let hourly_count = self
            .counters
            .get(&hourly_key(recipient, now))
            .await?
            .unwrap_or(0);
        let daily_count = self
            .counters
            .get(&daily_key(recipient, now))
            .await?
            .unwrap_or(0);

        Ok(RateLimitStatus {
            recipient: recipient.to_string(),
            hourly_count,
            hourly_limit: self.limits.hourly_limit,
            hourly_reset_secs: (hour_bucket_end(now) - now).num_seconds().max(0),
            daily_count,
            daily_limit: self.limits.daily_limit,
            daily_reset_secs: (day_bucket_end(now) - now).num_seconds().max(0),
        })
    }

    /// Clear both current buckets for a recipient (administrative).
    pub async fn reset(&self, recipient: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.counters.delete(&hourly_key(recipient, now)).await?;
        self.counters.delete(&daily_key(recipient, now)).await?;
        tracing::info!(recipient, "rate limit reset");
        Ok(())
    }
}

/// Counts and limits for one recipient's current buckets.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub recipient: String,
    pub hourly_count: u64,
    pub hourly_limit: u64,
    pub hourly_reset_secs: i64,
    pub daily_count: u64,
    pub daily_limit: u64,
    pub daily_reset_secs: i64,
}

impl RateLimitStatus {
    pub fn is_allowed(&self) -> bool {
        self.hourly_count < self.hourly_limit && self.daily_count < self.daily_limit
    }
}

fn hourly_key(recipient: &str, now: DateTime<Utc>) -> String {
    format!("{HOURLY_KEY_PREFIX}{recipient}:{}", now.format("%Y-%m-%d-%H"))
}

fn daily_key(recipient: &str, now: DateTime<Utc>) -> String {
    format!("{DAILY_KEY_PREFIX}{recipient}:{}", now.format("%Y-%m-%d"))
}

fn hour_bucket_end(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::hours(1))
        .map(|start| start + TimeDelta::hours(1))
        .unwrap_or_else(|_| now + TimeDelta::hours(1))
}

fn day_bucket_end(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::days(1))
        .map(|start| start + TimeDelta::days(1))
        .unwrap_or_else(|_| now + TimeDelta::days(1))
}

/// Domain part of an address: the substring after the last `@`,
/// lowercased. Empty when there is no usable domain.
fn extract_domain(recipient: &str) -> String {
    match recipient.rfind('@') {
        Some(at) if at > 0 => recipient[at + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}
