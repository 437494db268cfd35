//! QueueEngine - enqueue, claim, and outcome recording.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::app::status::QueueCounts;
use crate::config::{PRIORITY_MAX, PRIORITY_MIN, QueueConfig};
use crate::domain::{Job, JobId, JobStatus, PayloadRef};
use crate::error::EngineError;
use crate::ports::{Clock, JobStore};
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;

/// Owns the job state machine.
///
/// Every status change in the system goes through one of the operations
/// here (or through the store's atomic claim, which the batch methods
/// delegate to). Collaborators are constructor-injected; with a
/// [`FixedClock`](crate::ports::FixedClock) and the in-memory stores the
/// whole engine runs deterministically under test.
pub struct QueueEngine {
    store: Arc<dyn JobStore>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            retry_policy: RetryPolicy::from_config(&config.retry),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Queue a job due immediately.
    pub async fn enqueue(
        &self,
        recipient: &str,
        payload: PayloadRef,
        priority: u8,
    ) -> Result<Job, EngineError> {
        let now = self.clock.now();
        self.enqueue_at(recipient, payload, priority, now).await
    }

    /// Queue a job due at `scheduled_at` (which may be in the future).
    ///
    /// Admission order: blacklist rejects outright; a whitelisted
    /// recipient is admitted without consulting the counters; everyone
    /// else must be under both rate windows.
    pub async fn enqueue_at(
        &self,
        recipient: &str,
        payload: PayloadRef,
        priority: u8,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
            return Err(EngineError::InvalidPriority {
                priority,
                min: PRIORITY_MIN,
                max: PRIORITY_MAX,
            });
        }

        if self.rate_limiter.is_blacklisted(recipient) {
            tracing::warn!(recipient, "enqueue rejected: blacklisted domain");
            return Err(EngineError::RecipientBlacklisted {
                recipient: recipient.to_string(),
            });
        }

        if !self.rate_limiter.is_whitelisted(recipient)
            && !self.rate_limiter.is_allowed(recipient).await?
        {
            return Err(EngineError::RateLimitExceeded {
                recipient: recipient.to_string(),
            });
        }

        let now = self.clock.now();
        let job = Job::new(
            JobId::generate_at(now),
            recipient,
            payload,
            priority,
            scheduled_at,
            self.retry_policy.max_retries,
            now,
        );
        self.store.insert(job.clone()).await?;

        tracing::info!(job_id = %job.id, recipient, priority, "job queued");
        Ok(job)
    }

    /// Claim up to `limit` due jobs from the general lane. Returned in
    /// selection order, already transitioned to Processing.
    pub async fn due_batch(&self, limit: usize) -> Result<Vec<Job>, EngineError> {
        let now = self.clock.now();
        let selected = self.store.select_due(now, limit).await?;
        self.claim_selected(selected, now).await
    }

    /// Claim up to `limit` due jobs with
    /// `priority <= high_priority_threshold`.
    pub async fn high_priority_batch(&self, limit: usize) -> Result<Vec<Job>, EngineError> {
        let now = self.clock.now();
        let selected = self
            .store
            .select_high_priority(now, self.config.high_priority_threshold, limit)
            .await?;
        self.claim_selected(selected, now).await
    }

    /// Between select and claim another poller may have taken some of
    /// the batch; only jobs the conditional update actually claimed are
    /// returned.
    async fn claim_selected(
        &self,
        selected: Vec<Job>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, EngineError> {
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<JobId> = selected.iter().map(|j| j.id).collect();
        let claimed = self.store.claim_batch(&ids, now).await?;
        if claimed.len() < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                claimed = claimed.len(),
                "lost part of a claim batch to a concurrent poller"
            );
        }

        let batch = selected
            .into_iter()
            .filter(|j| claimed.contains(&j.id))
            .map(|mut j| {
                j.begin_processing(now);
                j
            })
            .collect();
        Ok(batch)
    }

    /// Success: Processing -> Sent, and the send counts against the
    /// recipient's rate windows.
    ///
    /// Best-effort bookkeeping: the send already happened, so an
    /// unknown id or a job in the wrong state is logged and ignored
    /// rather than surfaced.
    pub async fn record_success(&self, job_id: JobId) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "record_success for unknown job");
            return Ok(());
        };
        if job.status != JobStatus::Processing {
            tracing::warn!(%job_id, status = ?job.status, "record_success for job not in flight");
            return Ok(());
        }

        job.mark_sent(now);
        self.store.update(job.clone()).await?;

        if !self.rate_limiter.is_whitelisted(&job.recipient) {
            self.rate_limiter.record_send(&job.recipient).await?;
        }

        tracing::info!(%job_id, recipient = %job.recipient, "job sent");
        Ok(())
    }

    /// Failure: Processing -> Pending with backoff while the retry
    /// budget lasts, then Processing -> Failed.
    pub async fn record_failure(&self, job_id: JobId, error: &str) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "record_failure for unknown job");
            return Ok(());
        };
        if job.status != JobStatus::Processing {
            tracing::warn!(%job_id, status = ?job.status, "record_failure for job not in flight");
            return Ok(());
        }

        if job.can_retry() {
            // The policy sees the post-increment count.
            let next = self.retry_policy.next_attempt_at(now, job.retry_count + 1);
            job.schedule_retry(next, error.to_string(), now);
            tracing::info!(
                %job_id,
                retry = job.retry_count,
                next_attempt_at = %next,
                "job scheduled for retry"
            );
        } else {
            job.mark_failed(error.to_string(), now);
            tracing::warn!(%job_id, error, "job failed permanently: retries exhausted");
        }

        self.store.update(job).await?;
        Ok(())
    }

    /// Failure the sender knows is not retryable: Processing -> Failed
    /// without touching the retry budget.
    pub async fn record_permanent_failure(
        &self,
        job_id: JobId,
        error: &str,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "record_permanent_failure for unknown job");
            return Ok(());
        };
        if job.status != JobStatus::Processing {
            tracing::warn!(%job_id, status = ?job.status, "record_permanent_failure for job not in flight");
            return Ok(());
        }

        job.mark_failed_permanently(error.to_string(), now);
        self.store.update(job).await?;
        tracing::warn!(%job_id, error, "job failed permanently");
        Ok(())
    }

    /// Withdraw a job that has not been claimed yet. Returns whether it
    /// was actually cancelled; a claimed or finished job is left alone.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "cancel for unknown job");
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }

        job.mark_cancelled(now);
        // Conditional on still-Pending: a claim that commits between the
        // read above and this write wins, and the cancel reports false.
        if !self.store.update_if_status(job, JobStatus::Pending).await? {
            tracing::warn!(%job_id, "cancel lost the race to a concurrent claim");
            return Ok(false);
        }
        tracing::info!(%job_id, "job cancelled");
        Ok(true)
    }

    /// Administrative re-queue of a permanently failed job: due
    /// immediately, error cleared, retry count preserved.
    pub async fn manual_retry(&self, job_id: JobId) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let Some(mut job) = self.store.get(job_id).await? else {
            tracing::warn!(%job_id, "manual_retry for unknown job");
            return Ok(false);
        };
        if job.status != JobStatus::Failed {
            return Ok(false);
        }

        job.reset_for_manual_retry(now);
        if !self.store.update_if_status(job, JobStatus::Failed).await? {
            tracing::warn!(%job_id, "manual_retry lost to a concurrent status change");
            return Ok(false);
        }
        tracing::info!(%job_id, "job manually re-queued");
        Ok(true)
    }

    pub async fn job(&self, job_id: JobId) -> Result<Option<Job>, EngineError> {
        Ok(self.store.get(job_id).await?)
    }

    pub async fn counts(&self) -> Result<QueueCounts, EngineError> {
        Ok(self.store.counts_by_status().await?)
    }

    /// Retention sweep: delete Sent / Failed jobs last touched before
    /// `cutoff`, at most `limit` per call. Returns how many went.
    pub async fn sweep_terminal(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, EngineError> {
        let old = self.store.select_terminal_before(cutoff, limit).await?;
        if old.is_empty() {
            return Ok(0);
        }
        let ids: Vec<JobId> = old.iter().map(|j| j.id).collect();
        let removed = self.store.delete(&ids).await?;
        tracing::info!(removed, "swept old terminal jobs");
        Ok(removed)
    }
}
