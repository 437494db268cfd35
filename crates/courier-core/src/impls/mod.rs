//! Reference implementations of the storage ports (in-memory, for
//! development and tests).

pub mod memory_counters;
pub mod memory_store;

pub use self::memory_counters::InMemoryCounterStore;
pub use self::memory_store::InMemoryJobStore;
