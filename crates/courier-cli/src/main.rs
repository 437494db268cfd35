use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use courier_core::config::QueueConfig;
use courier_core::domain::{Job, JobStatus, PayloadRef};
use courier_core::impls::{InMemoryCounterStore, InMemoryJobStore};
use courier_core::ports::{Clock, SendError, Sender, SystemClock};
use courier_core::ratelimit::RateLimiter;
use courier_core::{QueueEngine, QueueRunner};

/// Demo sender: prints instead of speaking SMTP, and fails the first
/// few deliveries so the retry/backoff path is visible.
struct PrintingSender {
    remaining_failures: AtomicU32,
}

impl PrintingSender {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl Sender for PrintingSender {
    async fn deliver(&self, job: &Job) -> Result<(), SendError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(SendError::Retryable(format!(
                "intentional failure (left={left})"
            )));
        }

        println!(
            "-> delivering '{}' to {} (priority {}, attempt {})",
            job.payload.template(),
            job.recipient,
            job.priority,
            job.retry_count + 1,
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // (A) Wire the engine: in-memory stores, wall clock, demo-friendly
    // timings (fast backoff so the retries are watchable).
    let mut config = QueueConfig::default();
    config.retry.base_delay_ms = 500;
    config.poll_interval_ms = 200;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryJobStore::new());
    let counters = Arc::new(InMemoryCounterStore::new(clock.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(
        counters,
        clock.clone(),
        config.rate_limit.clone(),
        config.filter.clone(),
    ));
    let engine = Arc::new(QueueEngine::new(store, rate_limiter, clock, config));

    // (B) Start the poll loop with a sender that fails twice.
    let runner = Arc::new(QueueRunner::new(
        engine.clone(),
        Arc::new(PrintingSender::new(2)),
    ));
    let poll = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run().await }
    });

    // (C) Queue a bulk job and an urgent one; the urgent lane should
    // deliver the password reset first despite being enqueued second.
    let digest = engine
        .enqueue(
            "reader@example.com",
            PayloadRef::new("weekly-digest").var("articles", 12),
            3,
        )
        .await
        .expect("enqueue digest");
    let reset = engine
        .enqueue(
            "locked-out@example.com",
            PayloadRef::new("password-reset").var("token", "d3adb33f"),
            1,
        )
        .await
        .expect("enqueue reset");
    println!("enqueued: {} (bulk), {} (urgent)", digest.id, reset.id);

    // (D) Wait until both jobs are terminal.
    loop {
        let digest_status = engine.job(digest.id).await.expect("store").expect("job");
        let reset_status = engine.job(reset.id).await.expect("store").expect("job");
        if digest_status.status.is_terminal() && reset_status.status.is_terminal() {
            for job in [&reset_status, &digest_status] {
                println!(
                    "final: {} status={:?} retries={} last_error={:?}",
                    job.id, job.status, job.retry_count, job.last_error
                );
            }
            assert_eq!(digest_status.status, JobStatus::Sent);
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    println!("counts: {:?}", engine.counts().await.expect("store"));

    // Demo only; a real deployment would shut the loop down gracefully.
    poll.abort();
}
