//! Drain-policy tests for the queue processor
//!
//! Exercise the real queue, record store and usage reconciler over an
//! in-memory key-value store, against a scripted backend. Retry backoff
//! runs on tokio's paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use greenscan_core::config::{RetryConfig, UsageConfig};
use greenscan_core::domain::queue_entry::{AnalysisRequest, QueuedOperation};
use greenscan_core::domain::{OwnerId, QueueEntry, RecordId, RemoteError, SourceRef, Verdict};
use greenscan_core::ports::{
    AnalysisOutcome, ConnectivityState, IKeyValueStore, IRemoteBackend, NullEventSink,
    RemoteCounter, RemoteRecord,
};
use greenscan_quota::UsageReconciler;
use greenscan_queue::{DrainOutcome, DrainTarget, DurableRequestQueue, QueueProcessor};
use greenscan_store::RecordStore;

// ============================================================================
// Test doubles
// ============================================================================

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

fn vegan_outcome() -> AnalysisOutcome {
    AnalysisOutcome {
        ingredients: vec!["water".into(), "oats".into()],
        verdict: Verdict::Vegan,
        confidence: 0.97,
        flagged_ingredients: vec![],
        explanation: "All plant-based.".into(),
    }
}

/// Backend with a scripted reply list for analyze; empty script = success
struct ScriptedBackend {
    analyze_script: Mutex<VecDeque<Result<AnalysisOutcome, RemoteError>>>,
    analyze_calls: AtomicU32,
    deleted: Mutex<Vec<RecordId>>,
    used: AtomicU32,
    /// Concurrency tracking for the latch property
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    /// When set, analyze blocks until notified
    gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            analyze_script: Mutex::new(VecDeque::new()),
            analyze_calls: AtomicU32::new(0),
            deleted: Mutex::new(Vec::new()),
            used: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            gate: None,
        })
    }

    fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(Self {
            analyze_script: Mutex::new(VecDeque::new()),
            analyze_calls: AtomicU32::new(0),
            deleted: Mutex::new(Vec::new()),
            used: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            gate: Some(gate.clone()),
        });
        (backend, gate)
    }

    async fn script_analyze(&self, results: Vec<Result<AnalysisOutcome, RemoteError>>) {
        self.analyze_script.lock().await.extend(results);
    }
}

#[async_trait::async_trait]
impl IRemoteBackend for ScriptedBackend {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisOutcome, RemoteError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let result = self
            .analyze_script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(vegan_outcome()));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn upsert_record(
        &self,
        _record: &greenscan_core::domain::Record,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn fetch_records(&self, _owner_id: &OwnerId) -> Result<Vec<RemoteRecord>, RemoteError> {
        Ok(Vec::new())
    }

    async fn delete_record(&self, record_id: &RecordId) -> Result<(), RemoteError> {
        self.deleted.lock().await.push(*record_id);
        Ok(())
    }

    async fn get_counter(&self, _owner_id: &OwnerId) -> Result<RemoteCounter, RemoteError> {
        Ok(RemoteCounter {
            used: self.used.load(Ordering::SeqCst),
            limit: 30,
            period_start: None,
            period_end: None,
            is_premium: None,
        })
    }

    async fn increment_counter(
        &self,
        _owner_id: &OwnerId,
        amount: u32,
    ) -> Result<RemoteCounter, RemoteError> {
        let used = self.used.fetch_add(amount, Ordering::SeqCst) + amount;
        Ok(RemoteCounter {
            used,
            limit: 30,
            period_start: None,
            period_end: None,
            is_premium: None,
        })
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    queue: Arc<DurableRequestQueue>,
    records: Arc<RecordStore>,
    processor: Arc<QueueProcessor>,
    connectivity: ConnectivityState,
}

async fn fixture(backend: Arc<ScriptedBackend>) -> Fixture {
    let kv: Arc<dyn IKeyValueStore> = Arc::new(MemoryKv::default());
    let queue = Arc::new(DurableRequestQueue::load(kv.clone()).await.unwrap());
    let records = Arc::new(RecordStore::new(kv.clone()));
    let connectivity = ConnectivityState::new(true);
    let usage = Arc::new(UsageReconciler::new(
        backend.clone(),
        kv,
        connectivity.clone(),
        &UsageConfig::default(),
        &RetryConfig::default(),
    ));
    let processor = Arc::new(QueueProcessor::new(
        queue.clone(),
        backend,
        records.clone(),
        usage,
        Arc::new(NullEventSink),
        connectivity.clone(),
        &RetryConfig::default(),
    ));
    Fixture {
        queue,
        records,
        processor,
        connectivity,
    }
}

fn owner() -> OwnerId {
    OwnerId::new("owner-1").unwrap()
}

fn analyze_entry(owner_id: &OwnerId, n: u32) -> QueueEntry {
    QueueEntry::new(QueuedOperation::Analyze(AnalysisRequest {
        owner_id: owner_id.clone(),
        source_ref: SourceRef::new(format!("file:///scans/{n}.jpg")).unwrap(),
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_successful_drain_applies_side_effects() {
    let backend = ScriptedBackend::new();
    let f = fixture(backend.clone()).await;
    let owner = owner();

    f.queue.enqueue(analyze_entry(&owner, 1)).await.unwrap();
    let summary = f.processor.drain_if_idle().await.unwrap();

    assert_eq!(summary.outcome, DrainOutcome::Completed);
    assert_eq!(summary.processed, 1);
    assert!(f.queue.is_empty().await);

    let visible = f.records.visible_records(&owner).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].metadata().is_persisted());
    assert_eq!(visible[0].analysis().verdict(), Verdict::Vegan);
    // The drained analysis was counted against the quota
    assert_eq!(backend.used.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_drops_entry_and_continues() {
    let backend = ScriptedBackend::new();
    backend
        .script_analyze(vec![
            Err(RemoteError::Validation("unreadable image".into())),
            Ok(vegan_outcome()),
        ])
        .await;
    let f = fixture(backend).await;
    let owner = owner();

    f.queue.enqueue(analyze_entry(&owner, 1)).await.unwrap();
    f.queue.enqueue(analyze_entry(&owner, 2)).await.unwrap();

    let summary = f.processor.drain_if_idle().await.unwrap();

    // The poison entry was dropped; the one behind it still completed
    assert_eq!(summary.outcome, DrainOutcome::Completed);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.processed, 1);
    assert!(f.queue.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_leaves_entry_at_head() {
    let backend = ScriptedBackend::new();
    // Outlast the whole budget: initial attempt + 3 retries
    backend
        .script_analyze(vec![
            Err(RemoteError::Network("down".into())),
            Err(RemoteError::Network("down".into())),
            Err(RemoteError::Network("down".into())),
            Err(RemoteError::Network("down".into())),
        ])
        .await;
    let f = fixture(backend.clone()).await;
    let owner = owner();

    let head = analyze_entry(&owner, 1);
    f.queue.enqueue(head.clone()).await.unwrap();
    f.queue.enqueue(analyze_entry(&owner, 2)).await.unwrap();

    let summary = f.processor.drain_if_idle().await.unwrap();

    assert_eq!(summary.outcome, DrainOutcome::Stalled);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.remaining, 2);
    // The stalled entry keeps its head position
    assert_eq!(f.queue.peek_oldest().await.map(|e| e.id()), Some(head.id()));
    assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 4);

    // Next trigger succeeds (script exhausted, default reply is success)
    let summary = f.processor.drain_if_idle().await.unwrap();
    assert_eq!(summary.outcome, DrainOutcome::Completed);
    assert_eq!(summary.processed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_offline_drain_leaves_queue_untouched() {
    let backend = ScriptedBackend::new();
    let f = fixture(backend.clone()).await;
    let owner = owner();

    f.queue.enqueue(analyze_entry(&owner, 1)).await.unwrap();
    f.connectivity.set_online(false);

    let summary = f.processor.drain_if_idle().await.unwrap();

    assert_eq!(summary.outcome, DrainOutcome::Offline);
    assert_eq!(summary.remaining, 1);
    assert_eq!(backend.analyze_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_entry_reaches_backend() {
    let backend = ScriptedBackend::new();
    let f = fixture(backend.clone()).await;
    let owner = owner();
    let record_id = RecordId::new();

    f.queue
        .enqueue(QueueEntry::new(QueuedOperation::DeleteRecord {
            owner_id: owner,
            record_id,
        }))
        .await
        .unwrap();

    let summary = f.processor.drain_if_idle().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(*backend.deleted.lock().await, vec![record_id]);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_triggers_run_exactly_one_drain() {
    let (backend, gate) = ScriptedBackend::gated();
    let f = fixture(backend.clone()).await;
    let owner = owner();

    f.queue.enqueue(analyze_entry(&owner, 1)).await.unwrap();

    // First trigger: drain parks inside the gated analyze call
    let first = {
        let processor = f.processor.clone();
        tokio::spawn(async move { processor.drain_if_idle().await.unwrap() })
    };
    while backend.in_flight.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // Second trigger while Processing: coalesced, not queued
    let second = f.processor.drain_if_idle().await.unwrap();
    assert_eq!(second.outcome, DrainOutcome::AlreadyRunning);

    gate.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.outcome, DrainOutcome::Completed);

    // At no instant was more than one execution in flight
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}
