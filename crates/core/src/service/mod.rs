//! Query/command surface of the sync engine.

mod sync_service;

pub use sync_service::{SyncService, SyncServiceTrait};
