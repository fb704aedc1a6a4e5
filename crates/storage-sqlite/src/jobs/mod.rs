//! SQLite storage implementation for sync jobs and schedules.

mod model;
mod repository;

pub use model::{SyncJobDB, SyncScheduleDB};
pub use repository::SqliteJobStore;
