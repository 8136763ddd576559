//! Local record store
//!
//! The canonical local copy of every analysis record, persisted as one JSON
//! blob per owner through the key-value port, plus an in-memory cached index
//! of the owner's *visible* records (persisted, newest first).
//!
//! ## Persistence model
//!
//! Every mutating method rewrites the owner's complete blob
//! (serialize-then-write) before returning, so a crash mid-operation can
//! never leave a partially applied store visible at restart. A corrupt or
//! unparseable blob on load is logged and treated as empty; losing cached
//! records is preferred over crash-looping, and the synchronizer repopulates
//! them from the remote copy on the next pass.
//!
//! ## Visible index
//!
//! `visible_records` serves the presentation layer from a cached index:
//! records with `is_persisted = true`, sorted by `last_modified` descending,
//! stable on ties by insertion order (the blob keeps insertion order, and
//! the sort is stable).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use greenscan_core::domain::{OwnerId, Record, RecordId};
use greenscan_core::ports::IKeyValueStore;

/// Storage key for an owner's record blob
fn records_key(owner_id: &OwnerId) -> String {
    format!("records/{}", owner_id)
}

/// The persisted per-owner document
#[derive(Debug, Serialize, Deserialize)]
struct OwnerRecordsBlob {
    /// Records in insertion order
    records: Vec<Record>,
    /// When this snapshot was written; used for staleness diagnostics
    updated_at: DateTime<Utc>,
}

/// Canonical local store of analysis records
///
/// Exclusively owns the local copy; everything else reads records through
/// this API and remote traffic goes only through the backend port.
pub struct RecordStore {
    /// Persistence primitive supplied by the platform layer
    kv: Arc<dyn IKeyValueStore>,
    /// Cached visible listing per owner
    index: DashMap<OwnerId, Vec<Record>>,
    /// Serializes read-modify-write cycles on the owner blobs
    write_lock: tokio::sync::Mutex<()>,
}

impl RecordStore {
    /// Creates a store over the given key-value port
    pub fn new(kv: Arc<dyn IKeyValueStore>) -> Self {
        Self {
            kv,
            index: DashMap::new(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    // ========================================================================
    // Blob load/save
    // ========================================================================

    /// Loads the owner's records, treating corrupt snapshots as empty
    async fn load(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<Record>> {
        let key = records_key(owner_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<OwnerRecordsBlob>(&raw) {
            Ok(blob) => Ok(blob.records),
            Err(err) => {
                warn!(
                    owner_id = %owner_id,
                    error = %err,
                    "Corrupt record blob, starting empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Serializes and writes the owner's complete record list
    async fn save(&self, owner_id: &OwnerId, records: &[Record]) -> anyhow::Result<()> {
        let blob = OwnerRecordsBlob {
            records: records.to_vec(),
            updated_at: Utc::now(),
        };
        let raw = serde_json::to_string(&blob)?;
        self.kv.set(&records_key(owner_id), &raw).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns every local record for the owner, drafts included
    pub async fn all(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<Record>> {
        self.load(owner_id).await
    }

    /// Returns one record by id
    pub async fn get(
        &self,
        owner_id: &OwnerId,
        record_id: RecordId,
    ) -> anyhow::Result<Option<Record>> {
        let records = self.load(owner_id).await?;
        Ok(records.into_iter().find(|r| r.id() == record_id))
    }

    /// Returns the owner's visible listing from the cached index
    ///
    /// Computes and caches the index on first access after startup.
    pub async fn visible_records(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<Record>> {
        if let Some(cached) = self.index.get(owner_id) {
            return Ok(cached.clone());
        }
        self.refresh_index(owner_id).await
    }

    /// Recomputes the owner's visible index from the full local store
    pub async fn refresh_index(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<Record>> {
        let records = self.load(owner_id).await?;
        let visible = compute_visible(&records);
        debug!(
            owner_id = %owner_id,
            total = records.len(),
            visible = visible.len(),
            "Refreshed visible record index"
        );
        self.index.insert(owner_id.clone(), visible.clone());
        Ok(visible)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Inserts or replaces a record (matched by id), then persists
    ///
    /// A replaced record keeps its original position so insertion order,
    /// the tie-breaker for the visible index, stays stable. The cached
    /// index is recomputed before returning.
    pub async fn upsert(&self, record: &Record) -> anyhow::Result<()> {
        let owner_id = record.owner_id().clone();
        let _guard = self.write_lock.lock().await;

        let mut records = self.load(&owner_id).await?;
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(&owner_id, &records).await?;

        self.index.insert(owner_id, compute_visible(&records));
        Ok(())
    }

    /// Removes a record by id, then persists; returns the removed record
    pub async fn remove(
        &self,
        owner_id: &OwnerId,
        record_id: RecordId,
    ) -> anyhow::Result<Option<Record>> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load(owner_id).await?;
        let position = records.iter().position(|r| r.id() == record_id);
        let removed = position.map(|i| records.remove(i));
        if removed.is_some() {
            self.save(owner_id, &records).await?;
            self.index
                .insert(owner_id.clone(), compute_visible(&records));
        }
        Ok(removed)
    }
}

/// Filters to persisted records, newest `last_modified` first, stable ties
fn compute_visible(records: &[Record]) -> Vec<Record> {
    let mut visible: Vec<Record> = records
        .iter()
        .filter(|r| r.metadata().is_persisted())
        .cloned()
        .collect();
    // sort_by is stable: ties keep insertion order
    visible.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));
    visible
}
