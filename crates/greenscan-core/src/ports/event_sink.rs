//! Engine event port (driven/secondary port)
//!
//! The presentation layer subscribes to engine events to refresh views and
//! show user-facing status ("saved for later", quota banners, retry
//! affordances). Delivery is fire-and-forget from the engine's perspective;
//! implementations must not block drain or sync progress on UI work.

use crate::domain::newtypes::{EntryId, OwnerId, RecordId};

/// Events the engine publishes toward the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A record entered the visible history (direct submit or queue drain)
    RecordSaved {
        /// The owning user
        owner_id: OwnerId,
        /// The saved record
        record_id: RecordId,
    },
    /// A submission could not complete and was saved for later
    SubmissionQueued {
        /// The owning user
        owner_id: OwnerId,
        /// The durable queue entry carrying it
        entry_id: EntryId,
    },
    /// A queued entry was dropped after a terminal failure
    EntryDropped {
        /// The dropped entry
        entry_id: EntryId,
        /// Why it could never succeed
        reason: String,
    },
    /// A drain pass stopped with work still queued (retry budget exhausted)
    ///
    /// The UI may surface a manual retry affordance; the next connectivity
    /// trigger retries automatically.
    RetryExhausted {
        /// The entry still at the head of the queue
        entry_id: EntryId,
    },
    /// A drain pass finished
    QueueDrained {
        /// Entries completed successfully
        processed: u32,
        /// Entries dropped on terminal failures
        dropped: u32,
        /// Entries still waiting
        remaining: u32,
    },
    /// The owner's quota for the current period is spent
    QuotaExhausted {
        /// The affected user
        owner_id: OwnerId,
    },
}

impl EngineEvent {
    /// Stable label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::RecordSaved { .. } => "record_saved",
            EngineEvent::SubmissionQueued { .. } => "submission_queued",
            EngineEvent::EntryDropped { .. } => "entry_dropped",
            EngineEvent::RetryExhausted { .. } => "retry_exhausted",
            EngineEvent::QueueDrained { .. } => "queue_drained",
            EngineEvent::QuotaExhausted { .. } => "quota_exhausted",
        }
    }
}

/// Port trait for publishing engine events to the shell layer
#[async_trait::async_trait]
pub trait IEventSink: Send + Sync {
    /// Publishes one event; failures are logged by callers, never fatal
    async fn publish(&self, event: EngineEvent) -> anyhow::Result<()>;
}

/// Sink that discards every event; useful in tests and headless contexts
#[derive(Debug, Default)]
pub struct NullEventSink;

#[async_trait::async_trait]
impl IEventSink for NullEventSink {
    async fn publish(&self, _event: EngineEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
