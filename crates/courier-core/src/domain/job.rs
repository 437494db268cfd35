//! Job record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::payload::PayloadRef;

/// Job status.
///
/// State transitions:
/// - Pending -> Processing -> Sent
/// - Pending -> Processing -> Pending (retry with backoff, until the budget runs out)
/// - Pending -> Processing -> Failed (budget exhausted, or permanent failure)
/// - Pending -> Cancelled (administrative, only while still Pending)
/// - Failed -> Pending (manual retry, administrative)
///
/// Using an enum ensures exhaustive matching and prevents invalid states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the queue; eligible for claim once `scheduled_at` is due.
    Pending,

    /// Claimed by exactly one worker, delivery in flight.
    Processing,

    /// Delivered successfully.
    Sent,

    /// Failed permanently (retry budget exhausted or non-retryable error).
    Failed,

    /// Withdrawn by an administrator before it was ever claimed.
    Cancelled,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions without an
    /// explicit administrative action)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Is this job eligible for claiming (given its due time)?
    pub fn is_claimable(self) -> bool {
        matches!(self, JobStatus::Pending)
    }
}

/// A unit of outbound work.
///
/// Design:
/// - This record is the single source of truth for a job's state.
/// - All state transitions happen through the methods below; nothing
///   writes `status` directly.
/// - Timestamps are wall-clock (`DateTime<Utc>`) because scheduling and
///   rate-limit windows are calendar-based, and records must survive a
///   process restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Rate-limit subject, typically the recipient address.
    pub recipient: String,

    /// Opaque reference to what should be rendered and sent.
    pub payload: PayloadRef,

    /// Lower is more urgent; ties break on `scheduled_at`, then id.
    pub priority: u8,

    pub status: JobStatus,

    /// Eligible for claim only once `now >= scheduled_at`.
    pub scheduled_at: DateTime<Utc>,

    /// Set once, on the transition to Sent.
    pub sent_at: Option<DateTime<Utc>>,

    /// Number of recorded failures. May end at `max_retries + 1` on a
    /// permanently failed job (the terminal failure still counts).
    pub retry_count: u32,

    pub max_retries: u32,

    /// Last failure description; cleared by a manual retry.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: JobId,
        recipient: impl Into<String>,
        payload: PayloadRef,
        priority: u8,
        scheduled_at: DateTime<Utc>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            recipient: recipient.into(),
            payload,
            priority,
            status: JobStatus::Pending,
            scheduled_at,
            sent_at: None,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Does another failure still fit in the retry budget?
    ///
    /// Evaluated before the failure is counted: with `max_retries = 3`
    /// the third failure still re-enters Pending, the fourth is terminal.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.scheduled_at <= now
    }

    pub fn is_high_priority(&self, threshold: u8) -> bool {
        self.priority <= threshold
    }

    /// Claim: Pending -> Processing. The store is responsible for making
    /// this exclusive (compare-and-set); the record just transitions.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.updated_at = now;
    }

    /// Success: Processing -> Sent.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Sent;
        self.sent_at = Some(now);
        self.updated_at = now;
    }

    /// Retryable failure: Processing -> Pending with a later due time.
    /// Counts the failure.
    pub fn schedule_retry(&mut self, next_attempt_at: DateTime<Utc>, error: String, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.status = JobStatus::Pending;
        self.scheduled_at = next_attempt_at;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Terminal failure: Processing -> Failed. Counts the failure; the
    /// count freezes here.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.status = JobStatus::Failed;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Terminal failure that bypasses the retry budget entirely, for
    /// errors the sender knows are not retryable. Does not count.
    pub fn mark_failed_permanently(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Administrative withdrawal: Pending -> Cancelled.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.updated_at = now;
    }

    /// Administrative override: Failed -> Pending, due immediately.
    /// Keeps `retry_count`; clears the recorded error.
    pub fn reset_for_manual_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.scheduled_at = now;
        self.last_error = None;
        self.updated_at = now;
    }
}
