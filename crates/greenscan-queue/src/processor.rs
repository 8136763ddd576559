//! Queue processor
//!
//! Drains the durable queue through the retry executor whenever a
//! connectivity trigger fires. The processor has exactly two states, Idle
//! and Processing, guarded by an atomic latch: overlapping triggers are
//! coalesced into the drain already in flight, never queued and never
//! cancelled.
//!
//! ## Drain policy
//!
//! While the queue is non-empty and connectivity holds, the oldest entry is
//! executed through the retry executor:
//!
//! - **Success**: the entry is removed, its side effects are applied
//!   (record store insert, usage counter increment, UI event) and the
//!   entry's payload (the only temporary resource a deferred submission
//!   holds) goes away with it.
//! - **Terminal failure**: the entry is removed anyway, with the loss
//!   logged, so a poison entry cannot block the queue forever.
//! - **Retry budget exhausted**: the loop stops with the entry still at
//!   the head and waits for the next trigger; the processor never
//!   busy-loops on an unreachable backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use greenscan_core::config::RetryConfig;
use greenscan_core::domain::queue_entry::{AnalysisRequest, QueuedOperation};
use greenscan_core::domain::{Analysis, QueueEntry, Record, RecordId, RemoteError};
use greenscan_core::ports::{ConnectivityState, EngineEvent, IEventSink, IRemoteBackend};
use greenscan_quota::UsageReconciler;
use greenscan_retry::RetryPolicy;
use greenscan_store::RecordStore;

use crate::queue::DurableRequestQueue;

/// How a drain pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue was emptied (or was already empty)
    Completed,
    /// Another drain was in flight; this trigger was coalesced into it
    AlreadyRunning,
    /// Connectivity was (or went) down; entries remain queued
    Offline,
    /// The head entry exhausted its retry budget; it stays at the head
    Stalled,
}

/// Summary of one drain pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// How the pass ended
    pub outcome: DrainOutcome,
    /// Entries completed successfully
    pub processed: u32,
    /// Entries dropped on terminal failures
    pub dropped: u32,
    /// Entries still queued when the pass ended
    pub remaining: u32,
}

impl DrainSummary {
    fn coalesced() -> Self {
        Self {
            outcome: DrainOutcome::AlreadyRunning,
            processed: 0,
            dropped: 0,
            remaining: 0,
        }
    }
}

/// Anything the connectivity monitor can ask to drain
///
/// Split out as a trait so the monitor can be exercised against a counting
/// stub in tests.
#[async_trait::async_trait]
pub trait DrainTarget: Send + Sync {
    /// Starts a drain unless one is already in flight
    async fn drain_if_idle(&self) -> anyhow::Result<DrainSummary>;
}

/// Drains the durable queue once connectivity allows
pub struct QueueProcessor {
    queue: Arc<DurableRequestQueue>,
    backend: Arc<dyn IRemoteBackend>,
    records: Arc<RecordStore>,
    usage: Arc<UsageReconciler>,
    events: Arc<dyn IEventSink>,
    connectivity: ConnectivityState,
    policy: RetryPolicy,
    /// Latch: true while a drain pass is in flight
    draining: AtomicBool,
}

impl QueueProcessor {
    /// Creates a processor over the given collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<DurableRequestQueue>,
        backend: Arc<dyn IRemoteBackend>,
        records: Arc<RecordStore>,
        usage: Arc<UsageReconciler>,
        events: Arc<dyn IEventSink>,
        connectivity: ConnectivityState,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            queue,
            backend,
            records,
            usage,
            events,
            connectivity,
            policy: RetryPolicy::from(retry),
            draining: AtomicBool::new(false),
        }
    }

    /// Publishes an event, demoting sink failures to a log line
    async fn publish(&self, event: EngineEvent) {
        let kind = event.kind();
        if let Err(err) = self.events.publish(event).await {
            debug!(kind, error = %err, "Event sink rejected engine event");
        }
    }

    // ========================================================================
    // Drain loop
    // ========================================================================

    async fn drain(&self) -> anyhow::Result<DrainSummary> {
        let mut processed: u32 = 0;
        let mut dropped: u32 = 0;

        let outcome = loop {
            if !self.connectivity.is_online() {
                debug!("Connectivity lost, leaving remaining entries queued");
                break DrainOutcome::Offline;
            }

            let Some(entry) = self.queue.peek_oldest().await else {
                break DrainOutcome::Completed;
            };

            self.queue.record_attempt(entry.id()).await?;

            match self.execute_entry(&entry).await {
                Ok(()) => {
                    self.queue.remove(entry.id()).await?;
                    processed += 1;
                    debug!(
                        entry_id = %entry.id(),
                        kind = entry.operation().kind(),
                        "Queued entry completed"
                    );
                }
                Err(err) if is_retryable(&err) => {
                    // Budget exhausted on a transient failure: the entry
                    // keeps its head position for the next trigger.
                    warn!(
                        entry_id = %entry.id(),
                        kind = entry.operation().kind(),
                        attempts = entry.attempt_count() + 1,
                        error = %err,
                        "Retry budget exhausted, drain paused"
                    );
                    self.publish(EngineEvent::RetryExhausted {
                        entry_id: entry.id(),
                    })
                    .await;
                    break DrainOutcome::Stalled;
                }
                Err(err) => {
                    // Terminal: drop the entry so it cannot poison the queue.
                    warn!(
                        entry_id = %entry.id(),
                        kind = entry.operation().kind(),
                        error = %err,
                        "Dropping queued entry after terminal failure"
                    );
                    self.queue.remove(entry.id()).await?;
                    dropped += 1;
                    self.publish(EngineEvent::EntryDropped {
                        entry_id: entry.id(),
                        reason: err.to_string(),
                    })
                    .await;
                }
            }
        };

        let remaining = self.queue.len().await as u32;
        info!(
            ?outcome,
            processed, dropped, remaining, "Drain pass finished"
        );
        self.publish(EngineEvent::QueueDrained {
            processed,
            dropped,
            remaining,
        })
        .await;

        Ok(DrainSummary {
            outcome,
            processed,
            dropped,
            remaining,
        })
    }

    // ========================================================================
    // Entry execution
    // ========================================================================

    async fn execute_entry(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        match entry.operation() {
            QueuedOperation::Analyze(request) => self.execute_analyze(request).await,
            QueuedOperation::DeleteRecord { record_id, .. } => {
                self.execute_delete(*record_id).await
            }
        }
    }

    async fn execute_analyze(&self, request: &AnalysisRequest) -> anyhow::Result<()> {
        let backend = self.backend.clone();
        let outcome = greenscan_retry::execute("queued_analyze", &self.policy, || {
            let backend = backend.clone();
            let request = request.clone();
            async move { backend.analyze(&request).await }
        })
        .await?;

        let mut record = Record::new(
            request.owner_id.clone(),
            outcome.ingredients,
            Analysis::new(
                outcome.verdict,
                outcome.confidence,
                outcome.flagged_ingredients,
                outcome.explanation,
            ),
            Some(request.source_ref.clone()),
        );
        record.mark_persisted();
        self.records.upsert(&record).await?;

        // The analysis itself succeeded; a usage accounting hiccup must not
        // fail the entry and trigger a duplicate analysis.
        if let Err(err) = self.usage.record_usage(&request.owner_id).await {
            warn!(
                owner_id = %request.owner_id,
                error = %err,
                "Usage accounting failed after successful queued analysis"
            );
        }

        self.publish(EngineEvent::RecordSaved {
            owner_id: request.owner_id.clone(),
            record_id: record.id(),
        })
        .await;
        Ok(())
    }

    async fn execute_delete(&self, record_id: RecordId) -> anyhow::Result<()> {
        let backend = self.backend.clone();
        greenscan_retry::execute("queued_delete", &self.policy, || {
            let backend = backend.clone();
            async move { backend.delete_record(&record_id).await }
        })
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DrainTarget for QueueProcessor {
    async fn drain_if_idle(&self) -> anyhow::Result<DrainSummary> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in flight, trigger coalesced");
            return Ok(DrainSummary::coalesced());
        }

        let result = self.drain().await;
        self.draining.store(false, Ordering::Release);
        result
    }
}

/// True when the failure came from the remote taxonomy and is retryable;
/// local failures (persistence and the like) are always terminal here.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RemoteError>()
        .map(RemoteError::is_retryable)
        .unwrap_or(false)
}
