//! JobStore port - the durable source of truth for job records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::status::QueueCounts;
use crate::domain::{Job, JobId, JobStatus};
use crate::error::StoreError;

/// Durable collection of jobs, keyed by id.
///
/// # Design principles
/// - The claim authority lives here: `claim_batch` must be a single
///   conditional update (compare-and-set on status) so that concurrent
///   pollers never claim the same job twice. A relational backend
///   expresses this as `UPDATE .. SET status = 'PROCESSING' WHERE
///   status = 'PENDING' AND id IN (..)` and compares the affected-row
///   count against the requested set.
/// - Selection queries never return a job that is not Pending or not
///   yet due; ordering is `(priority ASC, scheduled_at ASC, id ASC)`.
/// - No other component writes a job's status outside the transitions
///   on the record itself.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Persist a record previously read from this store.
    async fn update(&self, job: Job) -> Result<(), StoreError>;

    /// Persist `job` only if the stored record's status still equals
    /// `expected`; returns whether the write happened. The single-job
    /// twin of `claim_batch` for administrative transitions, so a
    /// read-check-write caller cannot overwrite a claim that committed
    /// between its read and its write. A relational backend expresses
    /// this as `UPDATE .. WHERE id = .. AND status = ..` and checks the
    /// affected-row count.
    async fn update_if_status(&self, job: Job, expected: JobStatus) -> Result<bool, StoreError>;

    /// Pending jobs with `scheduled_at <= now`, ordered by
    /// `(priority, scheduled_at, id)`, at most `limit`.
    async fn select_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Same as `select_due`, restricted to `priority <= threshold`.
    async fn select_high_priority(
        &self,
        now: DateTime<Utc>,
        threshold: u8,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Atomically transition each id Pending -> Processing, skipping any
    /// job that is no longer Pending. Returns the ids actually claimed.
    async fn claim_batch(&self, ids: &[JobId], now: DateTime<Utc>)
    -> Result<Vec<JobId>, StoreError>;

    /// Terminal (Sent / Failed) jobs last touched before `cutoff`, for
    /// the retention sweep. Cancelled jobs are kept for audit.
    async fn select_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Remove records; returns how many existed.
    async fn delete(&self, ids: &[JobId]) -> Result<usize, StoreError>;

    async fn counts_by_status(&self) -> Result<QueueCounts, StoreError>;
}
