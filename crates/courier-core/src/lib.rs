//! courier-core
//!
//! A durable, priority-ordered outbound job queue with rate limiting
//! and retry-with-backoff, shaped for email delivery but generic over
//! what actually gets sent.
//!
//! # Module map
//! - **domain**: the job record, its status state machine, ids, payload
//!   references
//! - **ports**: collaborator interfaces (Clock, JobStore, CounterStore,
//!   Sender)
//! - **impls**: in-memory reference implementations of the storage ports
//! - **app**: the queue engine, the poll-loop runner, status views
//! - **retry** / **ratelimit**: the numeric policies (exponential
//!   backoff, dual-window admission control)
//! - **config** / **error**: configuration values and error taxonomy
//!
//! # Guarantees
//! At-most-one concurrent claim per job, enforced by the store's atomic
//! claim; not exactly-once delivery (a crash between send and commit can
//! duplicate a send). Priority is a scheduling hint: within one batch
//! jobs arrive in `(priority, scheduled_at)` order, but batches racing
//! on different pollers may interleave.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod ratelimit;
pub mod retry;

pub use app::{QueueCounts, QueueEngine, QueueRunner, TickSummary};
pub use config::QueueConfig;
pub use domain::{Job, JobId, JobStatus, PayloadRef};
pub use error::{EngineError, StoreError};
pub use ratelimit::{RateLimitStatus, RateLimiter};
pub use retry::RetryPolicy;
