//! Ports - interfaces to external collaborators.
//!
//! Each trait hides an external system (a relational store for jobs, a
//! counter store such as Redis, the SMTP/provider transport) behind an
//! interface the engine can be tested against.

pub mod clock;
pub mod counter_store;
pub mod job_store;
pub mod sender;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::counter_store::CounterStore;
pub use self::job_store::JobStore;
pub use self::sender::{SendError, Sender};
