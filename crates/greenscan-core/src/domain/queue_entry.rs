//! Durable queue entry entity
//!
//! A [`QueueEntry`] is one pending outbound operation awaiting network
//! availability. Entries are created when an operation cannot complete
//! synchronously, mutated only by the queue processor (`attempt_count`),
//! and destroyed on success or non-retryable failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{EntryId, OwnerId, RecordId, SourceRef};

/// Payload of an ingredient-analysis submission
///
/// Carries everything the remote analyze call needs, so a queued submission
/// can be replayed hours later without consulting other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The submitting owner
    pub owner_id: OwnerId,
    /// Reference to the captured label image
    pub source_ref: SourceRef,
}

/// The outbound operations the durable queue can carry
///
/// Serialized with an explicit `kind` tag so persisted snapshots stay
/// readable and future kinds can be added without breaking old entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum QueuedOperation {
    /// Submit a deferred ingredient analysis
    Analyze(AnalysisRequest),
    /// Propagate a record deletion made while offline
    ///
    /// Deletes must reach the backend eventually: the synchronizer's pull
    /// step inserts any remote record absent locally, so a delete that never
    /// propagates would resurrect on the next sync.
    DeleteRecord {
        /// The owner the record belonged to
        owner_id: OwnerId,
        /// The record to delete remotely
        record_id: RecordId,
    },
}

impl QueuedOperation {
    /// Stable label for logs and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            QueuedOperation::Analyze(_) => "analyze",
            QueuedOperation::DeleteRecord { .. } => "delete_record",
        }
    }

    /// The owner this operation acts on behalf of
    pub fn owner_id(&self) -> &OwnerId {
        match self {
            QueuedOperation::Analyze(request) => &request.owner_id,
            QueuedOperation::DeleteRecord { owner_id, .. } => owner_id,
        }
    }
}

/// One pending outbound operation in the durable queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry identity
    id: EntryId,
    /// The operation to replay once connectivity returns
    operation: QueuedOperation,
    /// When the entry was enqueued; drives FIFO ordering
    created_at: DateTime<Utc>,
    /// Number of drain attempts made so far
    attempt_count: u32,
}

impl QueueEntry {
    /// Creates a fresh entry for the given operation
    pub fn new(operation: QueuedOperation) -> Self {
        Self {
            id: EntryId::new(),
            operation,
            created_at: Utc::now(),
            attempt_count: 0,
        }
    }

    /// Returns the entry identity
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the carried operation
    pub fn operation(&self) -> &QueuedOperation {
        &self.operation
    }

    /// Returns when the entry was enqueued
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns how many drain attempts were made
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns the source reference for analyze entries
    pub fn source_ref(&self) -> Option<&SourceRef> {
        match &self.operation {
            QueuedOperation::Analyze(request) => Some(&request.source_ref),
            QueuedOperation::DeleteRecord { .. } => None,
        }
    }

    /// Records one more drain attempt
    pub fn record_attempt(&mut self) {
        self.attempt_count += 1;
    }
}
