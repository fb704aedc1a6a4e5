//! Core error types for the sync engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use thiserror::Error;

use crate::sync::{JobStatus, SyncType};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync engine.
///
/// Per-item and per-page failures of a run never surface here: they are
/// recorded on the job itself. This enum covers request-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Another job for the same sync type is queued or running.
    #[error("A {sync_type} sync is already queued or running")]
    AlreadyRunning { sync_type: SyncType },

    #[error("Unknown sync type: {0}")]
    UnknownSyncType(String),

    #[error("Sync job not found: {0}")]
    JobNotFound(String),

    #[error("No schedule configured for sync type: {0}")]
    ScheduleNotFound(String),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Input validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Returns true if this error is the single-flight guard rejecting a run.
    pub fn is_already_running(&self) -> bool {
        matches!(self, Error::AlreadyRunning { .. })
    }

    /// Returns true for storage failures that may clear up on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Unexpected(_))
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Unexpected(format!("JSON error: {}", err))
    }
}
