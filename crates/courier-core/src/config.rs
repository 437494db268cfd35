//! Configuration consumed by the queue core.
//!
//! Values only; where they come from (file, env) is the embedding
//! application's concern. `Default` gives the stock deployment values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Accepted priority range for enqueue. 1 is most urgent; producers
/// conventionally use 1 (credential reset), 2 (invitations), 3 (bulk).
pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub filter: FilterConfig,

    /// Jobs claimed per lane per tick.
    pub batch_size: usize,

    pub poll_interval_ms: u64,

    /// Jobs with `priority <= threshold` also go through the
    /// high-priority lane.
    pub high_priority_threshold: u8,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            filter: FilterConfig::default(),
            batch_size: 10,
            poll_interval_ms: 30_000,
            high_priority_threshold: 2,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub hourly_limit: u64,
    pub daily_limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 100,
            daily_limit: 1_000,
        }
    }
}

/// Domain-based admission filtering.
///
/// The blacklist always applies. The whitelist only matters when
/// enabled, and whitelisting bypasses rate counting but never the
/// blacklist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub blacklist_domains: BTreeSet<String>,
    pub whitelist_enabled: bool,
    pub whitelist_domains: BTreeSet<String>,
}
