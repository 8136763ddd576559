//! Remote backend port (driven/secondary port)
//!
//! This module defines the interface to the Greenscan backend service:
//! analysis submission, record upsert/fetch/delete and the usage counter
//! endpoints.
//!
//! ## Design Notes
//!
//! - Returns typed [`RemoteError`] rather than `anyhow::Error`: the retry
//!   executor and queue processor classify failures, so the taxonomy must
//!   survive the port boundary intact.
//! - [`RemoteRecord`] is a port-level DTO, not a domain entity. Every field
//!   except `id` is optional because a record stored by an older client (or
//!   mangled in transit) may arrive partially shaped; the synchronizer's
//!   normalizer is responsible for coercing it into a [`Record`](crate::domain::Record).
//! - Adapters own all transport concerns: timeouts, status-code mapping,
//!   payload encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{OwnerId, RecordId};
use crate::domain::queue_entry::AnalysisRequest;
use crate::domain::record::{Record, Verdict};
use crate::domain::RemoteError;

// ============================================================================
// Port-level DTOs
// ============================================================================

/// Result of a successful remote analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    /// Ingredient list the service extracted from the submission
    pub ingredients: Vec<String>,
    /// Tri-state verdict
    pub verdict: Verdict,
    /// Confidence in `[0, 1]` as reported by the service
    pub confidence: f64,
    /// Ingredients that drove a non-vegan or uncertain verdict
    pub flagged_ingredients: Vec<String>,
    /// Human-readable explanation
    pub explanation: String,
}

/// Analysis sub-object of a fetched remote record, loosely shaped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteAnalysis {
    /// Verdict as a raw string; parsed leniently during normalization
    pub verdict: Option<String>,
    /// Confidence; clamped during normalization
    pub confidence: Option<f64>,
    /// Flagged ingredient list
    pub flagged_ingredients: Option<Vec<String>>,
    /// Explanation text
    pub explanation: Option<String>,
}

/// A record as the backend returns it, before normalization
///
/// Only `id` is load-bearing; a payload without one cannot participate in
/// the merge and is dropped by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteRecord {
    /// Record identity (UUID string)
    pub id: Option<String>,
    /// Owning user identity
    pub owner_id: Option<String>,
    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Analyzed ingredient list
    pub ingredients: Option<Vec<String>>,
    /// Analysis outcome
    pub analysis: Option<RemoteAnalysis>,
    /// Favorite flag
    pub is_favorite: Option<bool>,
    /// Last modification timestamp; drives last-writer-wins
    pub last_modified: Option<DateTime<Utc>>,
    /// Source material reference
    pub source_ref: Option<String>,
}

/// The usage counter as the backend reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCounter {
    /// Authoritative usage in the current period
    pub used: u32,
    /// Period limit for this owner's plan
    pub limit: u32,
    /// Start of the current period, when the service reports it
    pub period_start: Option<DateTime<Utc>>,
    /// End of the current period, when the service reports it
    pub period_end: Option<DateTime<Utc>>,
    /// Whether the owner is on a paid plan
    pub is_premium: Option<bool>,
}

// ============================================================================
// IRemoteBackend trait
// ============================================================================

/// Port trait for all remote backend operations
///
/// ## Implementation Notes
///
/// - Every call must carry an explicit request timeout, distinct from the
///   retry executor's backoff delays.
/// - Implementations perform no retries of their own; the retry executor
///   wraps calls at the orchestration layer.
/// - `upsert_record` is create-or-replace by record id.
#[async_trait::async_trait]
pub trait IRemoteBackend: Send + Sync {
    /// Submits an analysis request and returns the outcome
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, RemoteError>;

    /// Creates or replaces a record remotely, keyed by its id
    async fn upsert_record(&self, record: &Record) -> Result<(), RemoteError>;

    /// Fetches all records belonging to the given owner
    async fn fetch_records(&self, owner_id: &OwnerId) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Deletes a record remotely; deleting an unknown id is not an error
    async fn delete_record(&self, record_id: &RecordId) -> Result<(), RemoteError>;

    /// Reads the owner's usage counter
    async fn get_counter(&self, owner_id: &OwnerId) -> Result<RemoteCounter, RemoteError>;

    /// Increments the owner's usage counter by `amount`
    ///
    /// Returns the authoritative counter after the increment; callers adopt
    /// the returned value rather than guessing.
    async fn increment_counter(
        &self,
        owner_id: &OwnerId,
        amount: u32,
    ) -> Result<RemoteCounter, RemoteError>;
}
