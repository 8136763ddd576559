//! The engine facade
//!
//! A single explicitly constructed service owning every component, with its
//! persistence and backend dependencies injected; instantiated once at app
//! startup and passed by reference, which preserves single-instance
//! semantics without hidden globals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use greenscan_core::config::Config;
use greenscan_core::domain::queue_entry::{AnalysisRequest, QueuedOperation};
use greenscan_core::domain::{
    Analysis, EntryId, OwnerId, QueueEntry, Record, RecordId, RemoteError, SourceRef,
};
use greenscan_core::ports::{
    ConnectivityEvent, ConnectivityState, EngineEvent, IEventSink, IKeyValueStore, IRemoteBackend,
};
use greenscan_queue::{
    ConnectivityMonitor, DrainSummary, DrainTarget, DurableRequestQueue, QueueProcessor,
};
use greenscan_quota::{UsageReconciler, UsageStatus};
use greenscan_retry::RetryPolicy;
use greenscan_store::RecordStore;
use greenscan_sync::{RecordSynchronizer, SyncReport};

/// How a submission was resolved
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// The analysis completed synchronously; the record is already visible
    Completed(Record),
    /// The submission was queued for later delivery, not an error
    SavedForLater {
        /// The durable queue entry carrying the submission
        entry_id: EntryId,
    },
}

/// The offline-first engine behind the client shell
pub struct AnalysisEngine {
    config: Config,
    backend: Arc<dyn IRemoteBackend>,
    records: Arc<RecordStore>,
    queue: Arc<DurableRequestQueue>,
    processor: Arc<QueueProcessor>,
    synchronizer: Arc<RecordSynchronizer>,
    usage: Arc<UsageReconciler>,
    events: Arc<dyn IEventSink>,
    connectivity: ConnectivityState,
    policy: RetryPolicy,
}

impl AnalysisEngine {
    /// Builds the engine, loading the durable queue from its snapshot
    pub async fn new(
        config: Config,
        backend: Arc<dyn IRemoteBackend>,
        kv: Arc<dyn IKeyValueStore>,
        events: Arc<dyn IEventSink>,
    ) -> anyhow::Result<Self> {
        let connectivity = ConnectivityState::default();
        let records = Arc::new(RecordStore::new(kv.clone()));
        let queue = Arc::new(
            DurableRequestQueue::load(kv.clone())
                .await
                .context("Failed to load the durable request queue")?,
        );
        let usage = Arc::new(UsageReconciler::new(
            backend.clone(),
            kv,
            connectivity.clone(),
            &config.usage,
            &config.retry,
        ));
        let processor = Arc::new(QueueProcessor::new(
            queue.clone(),
            backend.clone(),
            records.clone(),
            usage.clone(),
            events.clone(),
            connectivity.clone(),
            &config.retry,
        ));
        let synchronizer = Arc::new(RecordSynchronizer::new(
            backend.clone(),
            records.clone(),
            &config.retry,
        ));
        let policy = RetryPolicy::from(&config.retry);

        info!(pending = queue.len().await, "Analysis engine initialized");

        Ok(Self {
            config,
            backend,
            records,
            queue,
            processor,
            synchronizer,
            usage,
            events,
            connectivity,
            policy,
        })
    }

    /// The shared connectivity handle; the platform layer may read it
    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.clone()
    }

    /// Spawns the debounced connectivity monitor task
    ///
    /// The platform layer registers its reachability subscription once at
    /// startup and forwards events into the channel; the monitor owns the
    /// shared connectivity state and triggers queue drains. Stop it through
    /// the returned token's owner.
    pub fn spawn_connectivity_monitor(
        &self,
        events: mpsc::Receiver<ConnectivityEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = ConnectivityMonitor::new(
            events,
            self.connectivity.clone(),
            self.processor.clone() as Arc<dyn DrainTarget>,
            Duration::from_millis(self.config.connectivity.debounce_ms),
            shutdown,
        );
        tokio::spawn(monitor.run())
    }

    async fn publish(&self, event: EngineEvent) {
        let kind = event.kind();
        if let Err(err) = self.events.publish(event).await {
            debug!(kind, error = %err, "Event sink rejected engine event");
        }
    }

    // ========================================================================
    // submit_analysis
    // ========================================================================

    /// Submits an ingredient analysis for the given owner
    ///
    /// Routes directly through the retry executor while online; while
    /// offline, or once the retry budget is spent on a transient failure,
    /// the submission is serialized into the durable queue and reported as
    /// [`SubmissionOutcome::SavedForLater`], never as an error. Terminal
    /// failures (quota exceeded, validation) surface unchanged.
    pub async fn submit_analysis(
        &self,
        source_ref: SourceRef,
        owner_id: OwnerId,
    ) -> anyhow::Result<SubmissionOutcome> {
        let status = self
            .usage
            .can_use(&owner_id)
            .await
            .context("Quota check failed")?;
        if !status.allowed {
            self.publish(EngineEvent::QuotaExhausted {
                owner_id: owner_id.clone(),
            })
            .await;
            return Err(RemoteError::QuotaExceeded.into());
        }

        let request = AnalysisRequest {
            owner_id: owner_id.clone(),
            source_ref,
        };

        if !self.connectivity.is_online() {
            return self.queue_submission(request).await;
        }

        let backend = self.backend.clone();
        let result = greenscan_retry::execute("analyze", &self.policy, || {
            let backend = backend.clone();
            let request = request.clone();
            async move { backend.analyze(&request).await }
        })
        .await;

        match result {
            Ok(outcome) => {
                let mut record = Record::new(
                    owner_id.clone(),
                    outcome.ingredients,
                    Analysis::new(
                        outcome.verdict,
                        outcome.confidence,
                        outcome.flagged_ingredients,
                        outcome.explanation,
                    ),
                    Some(request.source_ref),
                );
                record.mark_persisted();
                self.records
                    .upsert(&record)
                    .await
                    .context("Failed to store analysis record")?;

                if let Err(err) = self.usage.record_usage(&owner_id).await {
                    warn!(
                        owner_id = %owner_id,
                        error = %err,
                        "Usage accounting failed after successful analysis"
                    );
                }

                self.publish(EngineEvent::RecordSaved {
                    owner_id,
                    record_id: record.id(),
                })
                .await;
                Ok(SubmissionOutcome::Completed(record))
            }
            Err(err) if err.is_retryable() => {
                // Unreachable backend is not a user-visible failure
                warn!(
                    owner_id = %owner_id,
                    error = %err,
                    "Analysis unreachable after retries, saving for later"
                );
                self.queue_submission(request).await
            }
            Err(err @ RemoteError::QuotaExceeded) => {
                self.publish(EngineEvent::QuotaExhausted { owner_id }).await;
                Err(err.into())
            }
            Err(err) => Err(err).context("Analysis failed"),
        }
    }

    async fn queue_submission(
        &self,
        request: AnalysisRequest,
    ) -> anyhow::Result<SubmissionOutcome> {
        let owner_id = request.owner_id.clone();
        let entry = QueueEntry::new(QueuedOperation::Analyze(request));
        let entry_id = entry.id();
        self.queue
            .enqueue(entry)
            .await
            .context("Failed to queue submission")?;

        info!(owner_id = %owner_id, entry_id = %entry_id, "Submission saved for later");
        self.publish(EngineEvent::SubmissionQueued { owner_id, entry_id })
            .await;
        Ok(SubmissionOutcome::SavedForLater { entry_id })
    }

    // ========================================================================
    // Record surface
    // ========================================================================

    /// The owner's visible history, newest first (cached index)
    pub async fn get_visible_records(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<Record>> {
        self.records.visible_records(owner_id).await
    }

    /// Flips a record's favorite flag; the bumped `last_modified` makes the
    /// change win on the next sync pass
    pub async fn toggle_favorite(
        &self,
        owner_id: &OwnerId,
        record_id: RecordId,
    ) -> anyhow::Result<Record> {
        let mut record = self
            .records
            .get(owner_id, record_id)
            .await?
            .with_context(|| format!("No record {record_id} for owner {owner_id}"))?;
        record.toggle_favorite();
        self.records.upsert(&record).await?;
        Ok(record)
    }

    /// Removes a record locally and propagates the deletion remotely
    ///
    /// While offline (or when the backend stays unreachable through the
    /// retry budget) the remote deletion is queued; otherwise the next pull
    /// would resurrect the record from its remote copy.
    pub async fn delete_record(
        &self,
        owner_id: &OwnerId,
        record_id: RecordId,
    ) -> anyhow::Result<()> {
        self.records.remove(owner_id, record_id).await?;

        if self.connectivity.is_online() {
            let backend = self.backend.clone();
            let result = greenscan_retry::execute("delete_record", &self.policy, || {
                let backend = backend.clone();
                async move { backend.delete_record(&record_id).await }
            })
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() => {
                    warn!(record_id = %record_id, error = %err, "Remote delete deferred");
                }
                Err(err) => return Err(err).context("Remote delete failed"),
            }
        }

        self.queue
            .enqueue(QueueEntry::new(QueuedOperation::DeleteRecord {
                owner_id: owner_id.clone(),
                record_id,
            }))
            .await
            .context("Failed to queue deferred delete")?;
        Ok(())
    }

    /// Promotes a draft into the visible history
    pub async fn save_to_history(&self, record: &Record) -> anyhow::Result<Record> {
        let mut record = record.clone();
        record.mark_persisted();
        self.records.upsert(&record).await?;
        self.publish(EngineEvent::RecordSaved {
            owner_id: record.owner_id().clone(),
            record_id: record.id(),
        })
        .await;
        Ok(record)
    }

    // ========================================================================
    // Queue and sync surface
    // ========================================================================

    /// Drains the durable queue unless a drain is already in flight
    ///
    /// Returns the drain summary so the caller decides whether to log or
    /// surface failures; nothing here is fire-and-forget.
    pub async fn process_queue_if_idle(&self) -> anyhow::Result<DrainSummary> {
        self.processor.drain_if_idle().await
    }

    /// Reconciles the owner's records with the remote store
    ///
    /// Run opportunistically, typically when the record list comes into
    /// view. Also drains any pending offline usage events for the owner;
    /// their failure never fails the record sync.
    pub async fn sync_records(&self, owner_id: &OwnerId) -> anyhow::Result<SyncReport> {
        if let Err(err) = self.usage.sync_pending(owner_id).await {
            warn!(owner_id = %owner_id, error = %err, "Pending usage sync failed");
        }
        self.synchronizer.sync_owner(owner_id).await
    }

    /// Quota standing for the owner
    pub async fn get_usage_status(&self, owner_id: &OwnerId) -> anyhow::Result<UsageStatus> {
        self.usage.can_use(owner_id).await
    }

    /// Snapshot of the queued entries, for diagnostics
    pub async fn queued_entries(&self) -> Vec<QueueEntry> {
        self.queue.list_all().await
    }
}
