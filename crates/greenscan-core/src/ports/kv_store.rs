//! Key-value store port (driven/secondary port)
//!
//! The platform layer provides generic persisted key-value primitives; every
//! durable blob in the system (queue snapshot, per-owner record store,
//! per-owner usage counter) goes through this interface.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, app-sandbox files, etc.) and don't need domain-level
//!   classification; persistence failures are terminal for the current
//!   operation regardless of their cause.
//! - Values are complete JSON documents. Callers always write a full,
//!   self-consistent snapshot; implementations must make `set` atomic
//!   (all-or-nothing) so a reader never observes a partial write.

/// Port trait for persisted key-value blobs
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    /// Reads the blob stored under `key`, if any
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Atomically replaces the blob stored under `key`
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes the blob stored under `key`; missing keys are not an error
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
