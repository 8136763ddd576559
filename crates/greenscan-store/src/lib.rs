//! Greenscan Store - Local persistence
//!
//! SQLite-backed storage for:
//! - The durable request queue snapshot
//! - Per-owner record blobs and the cached visible index
//! - Per-owner usage counters and pending-usage lists
//!
//! ## Architecture
//!
//! This crate implements the `IKeyValueStore` port from `greenscan-core`
//! using a single SQLite blob table. It is a driven (secondary) adapter in
//! the hexagonal architecture. Every value is one complete JSON document;
//! `set` is an atomic UPSERT, so a crash mid-write can never expose a
//! partially applied snapshot.
//!
//! ## Key Components
//!
//! - [`StorePool`] - Connection pool with migration support
//! - [`SqliteKeyValueStore`] - The `IKeyValueStore` implementation
//! - [`RecordStore`] - The canonical local record store built on the port
//! - [`StoreError`] - Error types for storage operations

pub mod kv;
pub mod pool;
pub mod records;

pub use kv::SqliteKeyValueStore;
pub use pool::StorePool;
pub use records::RecordStore;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
