//! Durable request queue
//!
//! An append-only, persisted list of pending outbound operations. Every
//! mutating call serializes the complete entry list and writes it through
//! the key-value port before returning (serialize-then-write), so a crash
//! mid-write cannot leave a partially applied queue visible at restart.
//!
//! A corrupt or unparseable snapshot on load is treated as an empty queue:
//! losing deferred work is preferred over crash-looping on startup, and the
//! loss is logged.
//!
//! FIFO order is preserved for entries not removed; a retried entry keeps
//! its head position until success or permanent removal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use greenscan_core::domain::{EntryId, QueueEntry};
use greenscan_core::ports::IKeyValueStore;

/// Storage key for the queue snapshot
const QUEUE_KEY: &str = "queue/v1";

/// The persisted queue document
#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    /// Entries in FIFO order (oldest first)
    entries: Vec<QueueEntry>,
    /// When this snapshot was written
    updated_at: DateTime<Utc>,
}

/// Append-only persisted work list
///
/// Exclusively owns its entries; the processor borrows one entry at a time
/// for a single execution attempt and then asks the queue to remove it or
/// leave it at the head.
pub struct DurableRequestQueue {
    kv: Arc<dyn IKeyValueStore>,
    entries: Mutex<Vec<QueueEntry>>,
}

impl DurableRequestQueue {
    /// Loads the queue from its persisted snapshot
    ///
    /// A missing snapshot yields an empty queue; a corrupt one is logged and
    /// also yields an empty queue. Storage-level read failures propagate.
    pub async fn load(kv: Arc<dyn IKeyValueStore>) -> anyhow::Result<Self> {
        let entries = match kv.get(QUEUE_KEY).await? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<QueueSnapshot>(&raw) {
                Ok(snapshot) => snapshot.entries,
                Err(err) => {
                    warn!(
                        error = %err,
                        "Corrupt queue snapshot, starting with an empty queue"
                    );
                    Vec::new()
                }
            },
        };

        debug!(entries = entries.len(), "Durable queue loaded");
        Ok(Self {
            kv,
            entries: Mutex::new(entries),
        })
    }

    /// Serializes and writes the complete entry list
    async fn persist(&self, entries: &[QueueEntry]) -> anyhow::Result<()> {
        let snapshot = QueueSnapshot {
            entries: entries.to_vec(),
            updated_at: Utc::now(),
        };
        let raw = serde_json::to_string(&snapshot)?;
        self.kv.set(QUEUE_KEY, &raw).await
    }

    /// Appends an entry and persists the new snapshot
    pub async fn enqueue(&self, entry: QueueEntry) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(entry);
        self.persist(&entries).await?;
        debug!(len = entries.len(), "Entry enqueued");
        Ok(())
    }

    /// Returns the oldest entry without removing it
    pub async fn peek_oldest(&self) -> Option<QueueEntry> {
        self.entries.lock().await.first().cloned()
    }

    /// Removes and returns the oldest entry, persisting the new snapshot
    pub async fn remove_oldest(&self) -> anyhow::Result<Option<QueueEntry>> {
        let mut entries = self.entries.lock().await;
        if entries.is_empty() {
            return Ok(None);
        }
        let removed = entries.remove(0);
        self.persist(&entries).await?;
        Ok(Some(removed))
    }

    /// Removes the entry with the given id, persisting the new snapshot
    pub async fn remove(&self, id: EntryId) -> anyhow::Result<Option<QueueEntry>> {
        let mut entries = self.entries.lock().await;
        let position = entries.iter().position(|e| e.id() == id);
        let removed = position.map(|i| entries.remove(i));
        if removed.is_some() {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    /// Increments the attempt counter on the given entry and persists
    pub async fn record_attempt(&self, id: EntryId) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id() == id) {
            entry.record_attempt();
            self.persist(&entries).await?;
        }
        Ok(())
    }

    /// Returns every entry in FIFO order, for diagnostics
    pub async fn list_all(&self) -> Vec<QueueEntry> {
        self.entries.lock().await.clone()
    }

    /// Number of queued entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when no entries are queued
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use greenscan_core::domain::queue_entry::{AnalysisRequest, QueuedOperation};
    use greenscan_core::domain::{OwnerId, SourceRef};

    #[derive(Default)]
    struct MemoryKv {
        map: Mutex<HashMap<String, String>>,
    }

    #[async_trait::async_trait]
    impl IKeyValueStore for MemoryKv {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.map.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.map
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.map.lock().await.remove(key);
            Ok(())
        }
    }

    fn entry(n: u32) -> QueueEntry {
        QueueEntry::new(QueuedOperation::Analyze(AnalysisRequest {
            owner_id: OwnerId::new("owner-1").unwrap(),
            source_ref: SourceRef::new(format!("file:///scans/{n}.jpg")).unwrap(),
        }))
    }

    #[tokio::test]
    async fn test_enqueue_preserves_fifo_order() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv).await.unwrap();

        let first = entry(1);
        let second = entry(2);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();

        assert_eq!(queue.peek_oldest().await.map(|e| e.id()), Some(first.id()));
        let all = queue.list_all().await;
        assert_eq!(all[0].id(), first.id());
        assert_eq!(all[1].id(), second.id());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_preserves_order() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv.clone()).await.unwrap();

        let entries: Vec<QueueEntry> = (0..5).map(entry).collect();
        for e in &entries {
            queue.enqueue(e.clone()).await.unwrap();
        }

        // Reload from the persisted snapshot, as after a process restart
        let reloaded = DurableRequestQueue::load(kv).await.unwrap();
        let loaded = reloaded.list_all().await;
        assert_eq!(loaded, entries);
    }

    #[tokio::test]
    async fn test_remove_oldest() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv).await.unwrap();

        let first = entry(1);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(entry(2)).await.unwrap();

        let removed = queue.remove_oldest().await.unwrap();
        assert_eq!(removed.map(|e| e.id()), Some(first.id()));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_by_id_persists() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv.clone()).await.unwrap();

        let first = entry(1);
        let second = entry(2);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();

        queue.remove(second.id()).await.unwrap();

        let reloaded = DurableRequestQueue::load(kv).await.unwrap();
        assert_eq!(reloaded.len().await, 1);
        assert_eq!(
            reloaded.peek_oldest().await.map(|e| e.id()),
            Some(first.id())
        );
    }

    #[tokio::test]
    async fn test_record_attempt_survives_reload() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv.clone()).await.unwrap();

        let e = entry(1);
        queue.enqueue(e.clone()).await.unwrap();
        queue.record_attempt(e.id()).await.unwrap();
        queue.record_attempt(e.id()).await.unwrap();

        let reloaded = DurableRequestQueue::load(kv).await.unwrap();
        assert_eq!(
            reloaded.peek_oldest().await.map(|e| e.attempt_count()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_loads_empty() {
        let kv = Arc::new(MemoryKv::default());
        kv.set(QUEUE_KEY, "][ definitely not json").await.unwrap();

        let queue = DurableRequestQueue::load(kv).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let kv = Arc::new(MemoryKv::default());
        let queue = DurableRequestQueue::load(kv).await.unwrap();
        queue.enqueue(entry(1)).await.unwrap();

        let removed = queue.remove(EntryId::new()).await.unwrap();
        assert!(removed.is_none());
        assert_eq!(queue.len().await, 1);
    }
}
