//! Queue observability: counts per status.

use serde::Serialize;

/// Number of jobs in each status, for dashboards and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.sent + self.failed + self.cancelled
    }
}
