//! Job identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a queued job, assigned once at creation.
///
/// Backed by a ULID so ids sort by creation time. Selection uses the id
/// as the final tiebreak after `(priority, scheduled_at)`, which makes
/// the ordering total without an extra sequence column.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    /// Generate a fresh id whose timestamp half comes from the given
    /// clock reading. Tests with a fixed clock still get unique ids
    /// from the random half.
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let timestamp_ms = now.timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}
