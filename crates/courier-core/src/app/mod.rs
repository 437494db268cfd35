//! Application logic: the engine, the poll loop, and status views.

pub mod engine;
pub mod runner;
pub mod status;

pub use self::engine::QueueEngine;
pub use self::runner::{QueueRunner, TickSummary};
pub use self::status::QueueCounts;
