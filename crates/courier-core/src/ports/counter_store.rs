//! CounterStore port - expiring counters for rate-limit buckets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Keyed, expiring counters.
///
/// Keys are opaque strings; the rate limiter encodes the recipient and
/// window bucket into them. `incr` is one atomic operation that creates
/// the counter with its expiry when absent, so a counter can never
/// exist without an expiry attached.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter and return the new value. A missing or
    /// expired counter starts at zero and is created with `expires_at`.
    async fn incr(&self, key: &str, expires_at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Current value, `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
