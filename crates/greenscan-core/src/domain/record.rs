//! Record domain entity
//!
//! A [`Record`] is the persisted result of one ingredient analysis. The same
//! record (by id) may exist locally and remotely; conflict resolution between
//! the two copies is record-granularity last-writer-wins on
//! `metadata.last_modified`.
//!
//! ## Lifecycle
//!
//! ```text
//!    submit            save_to_history / queue drain        sync push
//!  ┌─────────┐  draft  ┌──────────────────┐   visible   ┌─────────────┐
//!  │ created │ ──────► │ is_persisted=false│ ──────────► │ is_persisted│ ──► remote upsert
//!  └─────────┘         └──────────────────┘             │    =true    │
//!                                                        └─────────────┘
//! ```
//!
//! A draft (`is_persisted = false`) never appears in the visible history
//! index and is never pushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::newtypes::{OwnerId, RecordId, SourceRef};

// ============================================================================
// Verdict
// ============================================================================

/// Tri-state outcome of an ingredient analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every recognized ingredient is plant-based
    Vegan,
    /// At least one ingredient is definitively animal-derived
    NonVegan,
    /// The analysis could not decide (unknown or ambiguous ingredients)
    #[default]
    Uncertain,
}

impl Verdict {
    /// Stable lowercase name, used in logs and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Vegan => "vegan",
            Verdict::NonVegan => "non_vegan",
            Verdict::Uncertain => "uncertain",
        }
    }

    /// Lenient parse accepting common wire spellings; `None` when unknown
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vegan" => Some(Verdict::Vegan),
            "non_vegan" | "non-vegan" | "nonvegan" | "not_vegan" => Some(Verdict::NonVegan),
            "uncertain" | "unknown" | "inconclusive" => Some(Verdict::Uncertain),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// The analysis outcome attached to a record
///
/// `confidence` is clamped into `[0, 1]` at construction; the field is
/// private so the invariant cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    verdict: Verdict,
    confidence: f64,
    flagged_ingredients: Vec<String>,
    explanation: String,
}

impl Analysis {
    /// Creates an analysis, clamping confidence into `[0, 1]`
    pub fn new(
        verdict: Verdict,
        confidence: f64,
        flagged_ingredients: Vec<String>,
        explanation: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            verdict,
            confidence,
            flagged_ingredients,
            explanation: explanation.into(),
        }
    }

    /// An empty, uncertain analysis used as the normalization fallback
    pub fn uncertain() -> Self {
        Self::new(Verdict::Uncertain, 0.0, Vec::new(), "")
    }

    /// Returns the verdict
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Returns the confidence in `[0, 1]`
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Returns the ingredients that drove a non-vegan or uncertain verdict
    pub fn flagged_ingredients(&self) -> &[String] {
        &self.flagged_ingredients
    }

    /// Returns the human-readable explanation
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

// ============================================================================
// RecordMetadata
// ============================================================================

/// Mutable bookkeeping attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Whether the owner starred this record
    is_favorite: bool,
    /// Whether the record is part of the visible history (false = draft)
    is_persisted: bool,
    /// Reference to the captured source material, if still available
    source_ref: Option<SourceRef>,
    /// Last local or remote modification; drives last-writer-wins
    last_modified: DateTime<Utc>,
}

impl RecordMetadata {
    /// Creates metadata for a fresh draft
    pub fn draft(source_ref: Option<SourceRef>) -> Self {
        Self {
            is_favorite: false,
            is_persisted: false,
            source_ref,
            last_modified: Utc::now(),
        }
    }

    /// Creates metadata with every field specified (reconstruction)
    pub fn new(
        is_favorite: bool,
        is_persisted: bool,
        source_ref: Option<SourceRef>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            is_favorite,
            is_persisted,
            source_ref,
            last_modified,
        }
    }

    /// Returns true if the owner starred this record
    pub fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    /// Returns true if the record belongs to the visible history
    pub fn is_persisted(&self) -> bool {
        self.is_persisted
    }

    /// Returns the source reference, if any
    pub fn source_ref(&self) -> Option<&SourceRef> {
        self.source_ref.as_ref()
    }

    /// Returns the last modification timestamp
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

// ============================================================================
// Record
// ============================================================================

/// The persisted result of one ingredient analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique, immutable identity, stable across local and remote
    id: RecordId,
    /// The owner this record belongs to
    owner_id: OwnerId,
    /// When the analysis was first produced
    created_at: DateTime<Utc>,
    /// Ingredient list the analysis was run against
    ingredients: Vec<String>,
    /// Analysis outcome
    analysis: Analysis,
    /// Mutable bookkeeping
    metadata: RecordMetadata,
}

impl Record {
    /// Creates a new draft record with a random id
    pub fn new(
        owner_id: OwnerId,
        ingredients: Vec<String>,
        analysis: Analysis,
        source_ref: Option<SourceRef>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            owner_id,
            created_at: Utc::now(),
            ingredients,
            analysis,
            metadata: RecordMetadata::draft(source_ref),
        }
    }

    /// Reconstructs a record from fully specified parts
    ///
    /// Used by the remote-payload normalizer and by tests; regular code paths
    /// should prefer [`Record::new`].
    pub fn from_parts(
        id: RecordId,
        owner_id: OwnerId,
        created_at: DateTime<Utc>,
        ingredients: Vec<String>,
        analysis: Analysis,
        metadata: RecordMetadata,
    ) -> Self {
        Self {
            id,
            owner_id,
            created_at,
            ingredients,
            analysis,
            metadata,
        }
    }

    // --- Getters ---

    /// Returns the record's identity
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the owner
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Returns when the analysis was first produced
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the analyzed ingredient list
    pub fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    /// Returns the analysis outcome
    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Returns the mutable bookkeeping block
    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    /// Shorthand for `metadata().last_modified()`
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.metadata.last_modified
    }

    /// True when this copy was modified strictly later than `other`
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.metadata.last_modified > other.metadata.last_modified
    }

    // --- Mutators ---

    /// Marks the record as part of the visible history and bumps `last_modified`
    pub fn mark_persisted(&mut self) {
        if !self.metadata.is_persisted {
            self.metadata.is_persisted = true;
            self.touch();
        }
    }

    /// Flips the favorite flag, bumps `last_modified`, returns the new value
    pub fn toggle_favorite(&mut self) -> bool {
        self.metadata.is_favorite = !self.metadata.is_favorite;
        self.touch();
        self.metadata.is_favorite
    }

    /// Drops the source reference once the captured material is cleaned up
    pub fn clear_source_ref(&mut self) {
        self.metadata.source_ref = None;
    }

    /// Bumps `last_modified` to now
    pub fn touch(&mut self) {
        self.metadata.last_modified = Utc::now();
    }

    /// Overrides `last_modified` (remote adoption and tests)
    pub fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.metadata.last_modified = at;
    }
}
