//! In-memory job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::app::status::QueueCounts;
use crate::domain::{Job, JobId, JobStatus};
use crate::error::StoreError;
use crate::ports::JobStore;

/// Job store backed by a single mutex-guarded map.
///
/// The map is the source of truth; `claim_batch` does its check-and-set
/// entirely under the lock, which gives it the same exclusivity a
/// conditional `UPDATE` gives a relational backend.
pub struct InMemoryJobStore {
    state: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Selection order: most urgent priority first, then earliest due, then
/// id (ULIDs sort by creation time) as the final tiebreak.
fn selection_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.scheduled_at.cmp(&b.scheduled_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.get(&id).cloned())
    }

    async fn update(&self, job: Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.insert(job.id, job);
        Ok(())
    }

    async fn update_if_status(&self, job: Job, expected: JobStatus) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.get(&job.id)
            && current.status == expected
        {
            state.insert(job.id, job);
            return Ok(true);
        }
        Ok(false)
    }

    async fn select_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<Job> = state.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by(selection_order);
        due.truncate(limit);
        Ok(due)
    }

    async fn select_high_priority(
        &self,
        now: DateTime<Utc>,
        threshold: u8,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<Job> = state
            .values()
            .filter(|j| j.is_due(now) && j.is_high_priority(threshold))
            .cloned()
            .collect();
        due.sort_by(selection_order);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_batch(
        &self,
        ids: &[JobId],
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, StoreError> {
        let mut state = self.state.lock().await;
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = state.get_mut(id)
                && job.status == JobStatus::Pending
            {
                job.begin_processing(now);
                claimed.push(*id);
            }
        }
        Ok(claimed)
    }

    async fn select_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut old: Vec<Job> = state
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Sent | JobStatus::Failed) && j.updated_at < cutoff
            })
            .cloned()
            .collect();
        old.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        old.truncate(limit);
        Ok(old)
    }

    async fn delete(&self, ids: &[JobId]) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut removed = 0;
        for id in ids {
            if state.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn counts_by_status(&self) -> Result<QueueCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for job in state.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Sent => counts.sent += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PayloadRef;
    use chrono::{TimeDelta, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn job(priority: u8, scheduled_at: DateTime<Utc>) -> Job {
        Job::new(
            JobId::generate_at(scheduled_at),
            "user@example.com",
            PayloadRef::new("welcome"),
            priority,
            scheduled_at,
            3,
            scheduled_at,
        )
    }

    #[tokio::test]
    async fn select_due_orders_by_priority_then_time() {
        let store = InMemoryJobStore::new();
        let now = t0();

        let low = job(3, now - TimeDelta::minutes(10));
        let urgent = job(1, now - TimeDelta::minutes(1));
        let mid_late = job(2, now - TimeDelta::minutes(1));
        let mid_early = job(2, now - TimeDelta::minutes(5));

        for j in [&low, &urgent, &mid_late, &mid_early] {
            store.insert(j.clone()).await.unwrap();
        }

        let due = store.select_due(now, 10).await.unwrap();
        let ids: Vec<JobId> = due.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![urgent.id, mid_early.id, mid_late.id, low.id]);
    }

    #[tokio::test]
    async fn select_due_skips_future_and_non_pending_jobs() {
        let store = InMemoryJobStore::new();
        let now = t0();

        let future = job(1, now + TimeDelta::minutes(1));
        let mut sent = job(1, now - TimeDelta::minutes(1));
        sent.begin_processing(now);
        sent.mark_sent(now);
        let due_job = job(2, now);

        for j in [&future, &sent, &due_job] {
            store.insert(j.clone()).await.unwrap();
        }

        let due = store.select_due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_job.id);
    }

    #[tokio::test]
    async fn select_due_respects_the_limit() {
        let store = InMemoryJobStore::new();
        let now = t0();
        for i in 0..5 {
            store
                .insert(job(3, now - TimeDelta::minutes(i)))
                .await
                .unwrap();
        }
        assert_eq!(store.select_due(now, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn high_priority_lane_filters_on_threshold() {
        let store = InMemoryJobStore::new();
        let now = t0();

        let urgent = job(1, now);
        let high = job(2, now);
        let bulk = job(3, now);
        for j in [&urgent, &high, &bulk] {
            store.insert(j.clone()).await.unwrap();
        }

        let lane = store.select_high_priority(now, 2, 10).await.unwrap();
        let ids: Vec<JobId> = lane.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![urgent.id, high.id]);
    }

    #[tokio::test]
    async fn claim_batch_claims_only_pending_jobs() {
        let store = InMemoryJobStore::new();
        let now = t0();

        let a = job(1, now);
        let b = job(1, now);
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();

        // b gets claimed out from under us.
        let first = store.claim_batch(&[b.id], now).await.unwrap();
        assert_eq!(first, vec![b.id]);

        let second = store.claim_batch(&[a.id, b.id], now).await.unwrap();
        assert_eq!(second, vec![a.id]);

        let a_after = store.get(a.id).await.unwrap().unwrap();
        assert_eq!(a_after.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn concurrent_claims_never_claim_a_job_twice() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = t0();

        let mut ids = Vec::new();
        for _ in 0..20 {
            let j = job(1, now);
            ids.push(j.id);
            store.insert(j).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let ids = ids.clone();
            handles.push(tokio::spawn(
                async move { store.claim_batch(&ids, now).await },
            ));
        }

        let mut all_claimed = Vec::new();
        for handle in handles {
            all_claimed.extend(handle.await.unwrap().unwrap());
        }

        // Union of claims is exactly the pending set, with no id twice.
        all_claimed.sort();
        all_claimed.dedup();
        assert_eq!(all_claimed.len(), ids.len());
    }

    #[tokio::test]
    async fn update_if_status_refuses_a_stale_write() {
        let store = InMemoryJobStore::new();
        let now = t0();
        let pending = job(1, now);
        store.insert(pending.clone()).await.unwrap();

        // Read while Pending, then a claim commits before the write.
        let mut cancelled = pending.clone();
        cancelled.mark_cancelled(now);
        store.claim_batch(&[pending.id], now).await.unwrap();

        let wrote = store
            .update_if_status(cancelled, JobStatus::Pending)
            .await
            .unwrap();
        assert!(!wrote);
        let stored = store.get(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn update_if_status_writes_when_the_status_still_matches() {
        let store = InMemoryJobStore::new();
        let now = t0();
        let pending = job(1, now);
        store.insert(pending.clone()).await.unwrap();

        let mut cancelled = pending.clone();
        cancelled.mark_cancelled(now);
        let wrote = store
            .update_if_status(cancelled, JobStatus::Pending)
            .await
            .unwrap();
        assert!(wrote);
        let stored = store.get(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn terminal_sweep_finds_only_old_sent_and_failed() {
        let store = InMemoryJobStore::new();
        let now = t0();
        let old = now - TimeDelta::days(40);

        let mut sent_old = job(3, old);
        sent_old.begin_processing(old);
        sent_old.mark_sent(old);

        let mut failed_old = job(3, old);
        failed_old.mark_failed("x".into(), old);

        let mut cancelled_old = job(3, old);
        cancelled_old.mark_cancelled(old);

        let mut sent_recent = job(3, now);
        sent_recent.begin_processing(now);
        sent_recent.mark_sent(now);

        let pending_old = job(3, old);

        for j in [&sent_old, &failed_old, &cancelled_old, &sent_recent, &pending_old] {
            store.insert(j.clone()).await.unwrap();
        }

        let cutoff = now - TimeDelta::days(30);
        let swept = store.select_terminal_before(cutoff, 10).await.unwrap();
        let mut ids: Vec<JobId> = swept.iter().map(|j| j.id).collect();
        ids.sort();
        let mut expected = vec![sent_old.id, failed_old.id];
        expected.sort();
        assert_eq!(ids, expected);

        let removed = store.delete(&ids).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(sent_old.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn counts_by_status_tallies_every_state() {
        let store = InMemoryJobStore::new();
        let now = t0();

        store.insert(job(3, now)).await.unwrap();
        let mut processing = job(3, now);
        processing.begin_processing(now);
        store.insert(processing).await.unwrap();
        let mut sent = job(3, now);
        sent.begin_processing(now);
        sent.mark_sent(now);
        store.insert(sent).await.unwrap();

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.total(), 3);
    }
}
