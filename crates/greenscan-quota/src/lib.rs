//! Greenscan Quota - Usage-counter reconciliation
//!
//! Tracks consumption of the rate-limited monthly analysis quota across
//! offline and online use. While online, increments go straight to the
//! backend and the authoritative response is adopted; while offline, a local
//! optimistic counter runs ahead and every event joins a persisted
//! pending-sync list that [`UsageReconciler::sync_pending`] drains later.
//!
//! The counter itself lives in `greenscan-core::domain::usage`; this crate
//! owns its persistence, freshness policy and remote reconciliation.

pub mod reconciler;

pub use reconciler::{UsageReconciler, UsageStatus};
