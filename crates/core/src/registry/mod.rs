//! Sync registry - maps each sync type to its matcher and data sources.

mod sync_registry;

pub use sync_registry::{RegistryEntry, SyncRegistry};
