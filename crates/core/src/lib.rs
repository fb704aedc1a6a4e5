//! StoreSync Core - sync job orchestration between Nhanh.vn and Shopify.
//!
//! This crate schedules recurring and on-demand sync runs, executes them
//! against rate-limited external APIs and records every run as a job. It is
//! database-agnostic: persistence goes through the `JobStore` trait,
//! implemented by the `storage-sqlite` crate.

pub mod clock;
pub mod config;
pub mod connectors;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod jobs;
pub mod matching;
pub mod ratelimit;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the engine surface
pub use service::{SyncService, SyncServiceTrait};
pub use sync::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
