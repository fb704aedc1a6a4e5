//! Job tracking - persistence contract and lifecycle management for sync jobs.

mod job_store_traits;
mod job_tracker;
mod memory_store;

pub use job_store_traits::JobStore;
pub use job_tracker::{JobTracker, INTERRUPTED_BY_RESTART};
pub use memory_store::InMemoryJobStore;
