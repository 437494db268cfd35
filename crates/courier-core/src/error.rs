//! Error types.

use thiserror::Error;

/// I/O failure from a storage collaborator. The engine performs no
/// retry of its own storage I/O; these propagate to the caller of the
/// triggering operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the queue engine.
///
/// Invalid transitions (cancelling an in-flight job, retrying a job that
/// is not Failed) are not errors: those operations return `false`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rate limit exceeded for recipient: {recipient}")]
    RateLimitExceeded { recipient: String },

    #[error("recipient domain is blacklisted: {recipient}")]
    RecipientBlacklisted { recipient: String },

    #[error("priority {priority} outside accepted range {min}..={max}")]
    InvalidPriority { priority: u8, min: u8, max: u8 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
