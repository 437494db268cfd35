//! Sender port - the delivery collaborator.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Job;

/// A failed delivery attempt, classified by the sender.
///
/// The engine itself treats every failure as retryable up to the budget;
/// distinguishing a transient SMTP timeout from a nonexistent mailbox is
/// the sender's call, and `Permanent` routes around the retry logic.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0}")]
    Retryable(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

/// Renders and transmits one claimed job. How the payload reference
/// becomes a message is entirely the implementation's business.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn deliver(&self, job: &Job) -> Result<(), SendError>;
}
