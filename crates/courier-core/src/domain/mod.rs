//! Domain model (ids, job record, payload reference).

pub mod ids;
pub mod job;
pub mod payload;

pub use self::ids::JobId;
pub use self::job::{Job, JobStatus};
pub use self::payload::PayloadRef;
