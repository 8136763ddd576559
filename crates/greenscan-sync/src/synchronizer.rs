//! Bidirectional record synchronizer
//!
//! ## Sync Flow
//!
//! 1. **Pull**: fetch all remote records for the owner; insert the ones
//!    absent locally, adopt the remote copy of the ones present only when it
//!    is strictly newer (record-granularity last-writer-wins on
//!    `last_modified`).
//! 2. **Push**: upsert every local record with `is_persisted = true`
//!    (create-or-replace by id). One record's failure never aborts the rest.
//! 3. **Cache refresh**: rebuild the owner's visible index from the full
//!    local store.
//!
//! Pull runs strictly before push, so a freshly pulled remote record is
//! visible before the push step decides what still needs pushing. Only one
//! sync per owner runs at a time, enforced by an in-memory latch; a
//! superseding trigger while a sync is in flight is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use greenscan_core::config::RetryConfig;
use greenscan_core::domain::{OwnerId, Record, RecordId};
use greenscan_core::ports::IRemoteBackend;
use greenscan_retry::RetryPolicy;
use greenscan_store::RecordStore;

use crate::normalize::normalize_remote_record;

/// How a sync pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Pull, push and refresh all ran
    Completed,
    /// Another sync for the same owner was in flight; this one was a no-op
    AlreadyRunning,
}

/// Summary of a completed synchronization cycle
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// How the pass ended
    pub outcome: SyncOutcome,
    /// Remote records inserted locally
    pub pulled: u32,
    /// Local records replaced by a newer remote copy
    pub adopted: u32,
    /// Remote payloads dropped by the normalizer (no usable id)
    pub dropped: u32,
    /// Local records upserted remotely
    pub pushed: u32,
    /// Per-record push failures (non-fatal)
    pub errors: Vec<String>,
    /// Wall-clock duration of the sync in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    fn already_running() -> Self {
        Self {
            outcome: SyncOutcome::AlreadyRunning,
            pulled: 0,
            adopted: 0,
            dropped: 0,
            pushed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Reconciles the local record store with the remote store, per owner
pub struct RecordSynchronizer {
    backend: Arc<dyn IRemoteBackend>,
    records: Arc<RecordStore>,
    policy: RetryPolicy,
    /// In-memory per-owner latch; present key = sync in flight
    latches: DashMap<OwnerId, ()>,
}

impl RecordSynchronizer {
    /// Creates a synchronizer over the given backend and local store
    pub fn new(
        backend: Arc<dyn IRemoteBackend>,
        records: Arc<RecordStore>,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            backend,
            records,
            policy: RetryPolicy::from(retry),
            latches: DashMap::new(),
        }
    }

    /// Runs one pull → push → refresh cycle for the owner
    ///
    /// Returns immediately with [`SyncOutcome::AlreadyRunning`] when a sync
    /// for the same owner is already in flight.
    pub async fn sync_owner(&self, owner_id: &OwnerId) -> anyhow::Result<SyncReport> {
        {
            use dashmap::mapref::entry::Entry;
            // The entry guard must drop before the first await point.
            match self.latches.entry(owner_id.clone()) {
                Entry::Occupied(_) => {
                    debug!(owner_id = %owner_id, "Sync already in flight, trigger coalesced");
                    return Ok(SyncReport::already_running());
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(());
                }
            }
        }

        let result = self.run_cycle(owner_id).await;
        self.latches.remove(owner_id);
        result
    }

    async fn run_cycle(&self, owner_id: &OwnerId) -> anyhow::Result<SyncReport> {
        let start = std::time::Instant::now();
        let mut report = SyncReport {
            outcome: SyncOutcome::Completed,
            pulled: 0,
            adopted: 0,
            dropped: 0,
            pushed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };

        info!(owner_id = %owner_id, "Starting sync cycle");

        // Step 1: Pull
        let backend = self.backend.clone();
        let remote_records = greenscan_retry::execute("fetch_records", &self.policy, || {
            let backend = backend.clone();
            let owner = owner_id.clone();
            async move { backend.fetch_records(&owner).await }
        })
        .await
        .context("Failed to fetch remote records")?;

        let local_by_id: HashMap<RecordId, Record> = self
            .records
            .all(owner_id)
            .await
            .context("Failed to load local records")?
            .into_iter()
            .map(|r| (r.id(), r))
            .collect();

        for raw in remote_records {
            let Some(remote) = normalize_remote_record(raw, owner_id) else {
                report.dropped += 1;
                continue;
            };

            match local_by_id.get(&remote.id()) {
                None => {
                    self.records
                        .upsert(&remote)
                        .await
                        .context("Failed to insert pulled record")?;
                    report.pulled += 1;
                }
                Some(local) if remote.is_newer_than(local) => {
                    debug!(
                        record_id = %remote.id(),
                        "Remote copy is newer, adopting it"
                    );
                    self.records
                        .upsert(&remote)
                        .await
                        .context("Failed to adopt newer remote record")?;
                    report.adopted += 1;
                }
                Some(_) => {
                    // Local copy wins; the push step will bring the remote
                    // side up to date.
                }
            }
        }

        // Step 2: Push. Failures are isolated per record.
        let local_records = self
            .records
            .all(owner_id)
            .await
            .context("Failed to reload local records for push")?;

        for record in local_records
            .iter()
            .filter(|r| r.metadata().is_persisted())
        {
            let backend = self.backend.clone();
            let push = greenscan_retry::execute("push_record", &self.policy, || {
                let backend = backend.clone();
                let record = record.clone();
                async move { backend.upsert_record(&record).await }
            })
            .await;

            match push {
                Ok(()) => report.pushed += 1,
                Err(err) => {
                    let msg = format!("Error pushing record '{}': {err}", record.id());
                    warn!(%msg);
                    report.errors.push(msg);
                }
            }
        }

        // Step 3: Cache refresh
        self.records
            .refresh_index(owner_id)
            .await
            .context("Failed to refresh visible index")?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            owner_id = %owner_id,
            pulled = report.pulled,
            adopted = report.adopted,
            pushed = report.pushed,
            dropped = report.dropped,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Sync cycle completed"
        );

        Ok(report)
    }
}
