//! SQLite storage implementation for StoreSync.
//!
//! This crate provides the database-backed `JobStore` using Diesel ORM with
//! SQLite. It contains:
//! - Database connection pooling and embedded migrations
//! - A single-writer actor that serializes every write
//! - The job and schedule repository with its Diesel model types
//!
//! # Architecture
//!
//! This crate is the only place where Diesel dependencies exist. The engine in
//! `storesync-core` is database-agnostic and works against the `JobStore` trait.
//!
//! ```text
//!        core (engine)
//!              │
//!              ▼
//!   storage-sqlite (this crate)
//!              │
//!              ▼
//!          SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

// Repository implementations
pub mod jobs;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

pub use jobs::SqliteJobStore;

// Re-export storage errors
pub use errors::StorageError;

// Re-export from storesync-core for convenience
pub use storesync_core::errors::{DatabaseError, Error, Result};
