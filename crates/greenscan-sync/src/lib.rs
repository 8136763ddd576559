//! Greenscan Sync - Bidirectional record synchronization
//!
//! Reconciles the local record store with the remote store for one owner at
//! a time: pull remote records (normalizing loosely shaped payloads), push
//! every persisted local record, then rebuild the owner's visible index.
//!
//! Conflict policy is record-granularity last-writer-wins on
//! `last_modified`; there is no field-level merge. Repeated runs with no
//! intervening writes are a no-op.

pub mod normalize;
pub mod synchronizer;

pub use normalize::normalize_remote_record;
pub use synchronizer::{RecordSynchronizer, SyncOutcome, SyncReport};
