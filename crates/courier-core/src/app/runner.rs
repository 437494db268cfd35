//! QueueRunner - the poll loop gluing engine and sender together.

use std::sync::Arc;

use crate::app::engine::QueueEngine;
use crate::domain::Job;
use crate::error::EngineError;
use crate::ports::{SendError, Sender};

/// What one tick did, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed_permanently: usize,
}

/// Drives the queue on a fixed interval.
///
/// Each tick runs the high-priority lane first, then the general lane,
/// so urgent jobs get worker time ahead of bulk without starving it.
/// Claimed jobs are delivered in selection order and their outcomes
/// recorded through the engine.
///
/// `tick` is public and does no sleeping, so tests drive the loop with
/// a virtual clock instead of waiting out the poll interval.
pub struct QueueRunner {
    engine: Arc<QueueEngine>,
    sender: Arc<dyn Sender>,
}

impl QueueRunner {
    pub fn new(engine: Arc<QueueEngine>, sender: Arc<dyn Sender>) -> Self {
        Self { engine, sender }
    }

    /// One scheduling tick: both lanes, claim, deliver, record.
    pub async fn tick(&self) -> Result<TickSummary, EngineError> {
        let mut summary = TickSummary::default();
        let batch_size = self.engine.config().batch_size;

        let urgent = self.engine.high_priority_batch(batch_size).await?;
        self.deliver_batch(urgent, &mut summary).await?;

        let general = self.engine.due_batch(batch_size).await?;
        self.deliver_batch(general, &mut summary).await?;

        Ok(summary)
    }

    /// Poll forever. Tick errors are logged, not fatal; the next tick
    /// gets a fresh chance.
    pub async fn run(&self) {
        let interval = self.engine.config().poll_interval();
        loop {
            match self.tick().await {
                Ok(summary) if summary.claimed > 0 => {
                    tracing::debug!(?summary, "tick complete");
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(%error, "tick failed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn deliver_batch(
        &self,
        jobs: Vec<Job>,
        summary: &mut TickSummary,
    ) -> Result<(), EngineError> {
        for job in jobs {
            summary.claimed += 1;
            match self.sender.deliver(&job).await {
                Ok(()) => {
                    self.engine.record_success(job.id).await?;
                    summary.sent += 1;
                }
                Err(SendError::Retryable(message)) => {
                    self.engine.record_failure(job.id, &message).await?;
                    summary.retried += 1;
                }
                Err(SendError::Permanent(message)) => {
                    self.engine
                        .record_permanent_failure(job.id, &message)
                        .await?;
                    summary.failed_permanently += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::domain::{JobStatus, PayloadRef};
    use crate::impls::{InMemoryCounterStore, InMemoryJobStore};
    use crate::ports::{Clock, FixedClock};
    use crate::ratelimit::RateLimiter;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn setup() -> (FixedClock, Arc<QueueEngine>) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let config = QueueConfig::default();
        let counters = Arc::new(InMemoryCounterStore::new(clock_arc.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            counters,
            clock_arc.clone(),
            config.rate_limit.clone(),
            config.filter.clone(),
        ));
        let engine = Arc::new(QueueEngine::new(
            Arc::new(InMemoryJobStore::new()),
            rate_limiter,
            clock_arc,
            config,
        ));
        (clock, engine)
    }

    /// Records delivery order; fails the first `failures` attempts.
    struct RecordingSender {
        remaining_failures: AtomicU32,
        delivered: Mutex<Vec<String>>,
    }

    impl RecordingSender {
        fn failing(failures: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Sender for RecordingSender {
        async fn deliver(&self, job: &Job) -> Result<(), SendError> {
            self.delivered.lock().await.push(job.recipient.clone());
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(SendError::Retryable(format!(
                    "intentional failure (left={left})"
                )));
            }
            Ok(())
        }
    }

    struct BouncingSender;

    #[async_trait]
    impl Sender for BouncingSender {
        async fn deliver(&self, _job: &Job) -> Result<(), SendError> {
            Err(SendError::Permanent("550 no such user".into()))
        }
    }

    #[tokio::test]
    async fn tick_delivers_urgent_jobs_before_bulk() {
        let (_clock, engine) = setup();
        engine
            .enqueue("bulk@example.com", PayloadRef::new("digest"), 3)
            .await
            .unwrap();
        engine
            .enqueue("urgent@example.com", PayloadRef::new("password-reset"), 1)
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender::failing(0));
        let runner = QueueRunner::new(engine, sender.clone());
        let summary = runner.tick().await.unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.sent, 2);
        assert_eq!(
            *sender.delivered.lock().await,
            vec!["urgent@example.com", "bulk@example.com"]
        );
    }

    #[tokio::test]
    async fn failed_delivery_comes_back_after_backoff() {
        let (clock, engine) = setup();
        let job = engine
            .enqueue("user@example.com", PayloadRef::new("welcome"), 3)
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender::failing(2));
        let runner = QueueRunner::new(engine.clone(), sender.clone());

        // First tick fails; the job is parked until the backoff expires.
        let summary = runner.tick().await.unwrap();
        assert_eq!(summary.retried, 1);
        assert_eq!(runner.tick().await.unwrap().claimed, 0);

        // 5s backoff, second failure, 10s backoff, then success.
        clock.advance(TimeDelta::seconds(5));
        assert_eq!(runner.tick().await.unwrap().retried, 1);
        clock.advance(TimeDelta::seconds(10));
        assert_eq!(runner.tick().await.unwrap().sent, 1);

        let stored = engine.job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Sent);
        assert_eq!(stored.retry_count, 2);
        assert_eq!(sender.delivered.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn permanent_send_errors_skip_the_retry_budget() {
        let (_clock, engine) = setup();
        let job = engine
            .enqueue("gone@example.com", PayloadRef::new("welcome"), 3)
            .await
            .unwrap();

        let runner = QueueRunner::new(engine.clone(), Arc::new(BouncingSender));
        let summary = runner.tick().await.unwrap();
        assert_eq!(summary.failed_permanently, 1);

        let stored = engine.job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn empty_queue_ticks_are_quiet() {
        let (_clock, engine) = setup();
        let runner = QueueRunner::new(engine, Arc::new(RecordingSender::failing(0)));
        assert_eq!(runner.tick().await.unwrap(), TickSummary::default());
    }
}
