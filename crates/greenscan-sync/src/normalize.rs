//! Remote record normalization
//!
//! The single defensive-coercion point for remote payloads. A partially
//! shaped record must never abort the merge, so every sub-field is coerced
//! to a safe default here, once, with one logged warning per record,
//! instead of ad hoc fallbacks scattered through the merge logic.
//!
//! ## Default table
//!
//! | Field              | Missing/malformed becomes                  |
//! |--------------------|--------------------------------------------|
//! | `id`               | record dropped (identity has no default)   |
//! | `owner_id`         | the owner the fetch was scoped to          |
//! | `created_at`       | `last_modified`, else now                  |
//! | `ingredients`      | empty list                                 |
//! | `analysis`         | uncertain, confidence 0, no flags          |
//! | `analysis.verdict` | `Uncertain`                                |
//! | `analysis.confidence` | 0, clamped into `[0, 1]` otherwise      |
//! | `is_favorite`      | `false`                                    |
//! | `last_modified`    | `created_at`, else now                     |
//! | `source_ref`       | none                                       |
//!
//! `is_persisted` is always `true`: the record exists remotely, which is
//! the definition of having been persisted.

use std::str::FromStr;

use chrono::Utc;
use tracing::warn;

use greenscan_core::domain::{
    Analysis, OwnerId, Record, RecordId, RecordMetadata, SourceRef, Verdict,
};
use greenscan_core::ports::RemoteRecord;

/// Coerces a loosely shaped remote payload into a domain [`Record`]
///
/// Returns `None` (with a warning) only when the payload carries no usable
/// id; every other defect is coerced per the default table above.
pub fn normalize_remote_record(raw: RemoteRecord, owner_id: &OwnerId) -> Option<Record> {
    let mut coercions: Vec<&'static str> = Vec::new();

    let id = match raw.id.as_deref().map(RecordId::from_str) {
        Some(Ok(id)) => id,
        Some(Err(_)) => {
            warn!(
                owner_id = %owner_id,
                raw_id = ?raw.id,
                "Dropping remote record with unparseable id"
            );
            return None;
        }
        None => {
            warn!(owner_id = %owner_id, "Dropping remote record without id");
            return None;
        }
    };

    match raw.owner_id.as_deref() {
        Some(remote_owner) if remote_owner == owner_id.as_str() => {}
        Some(_) => coercions.push("owner_id mismatch"),
        None => coercions.push("owner_id missing"),
    }

    let created_at = match raw.created_at {
        Some(at) => at,
        None => {
            coercions.push("created_at missing");
            raw.last_modified.unwrap_or_else(Utc::now)
        }
    };

    let last_modified = match raw.last_modified {
        Some(at) => at,
        None => {
            coercions.push("last_modified missing");
            created_at
        }
    };

    let ingredients = match raw.ingredients {
        Some(list) => list,
        None => {
            coercions.push("ingredients missing");
            Vec::new()
        }
    };

    let analysis = match raw.analysis {
        Some(remote) => {
            let verdict = match remote.verdict.as_deref() {
                Some(raw_verdict) => match Verdict::parse_lenient(raw_verdict) {
                    Some(verdict) => verdict,
                    None => {
                        coercions.push("verdict unrecognized");
                        Verdict::Uncertain
                    }
                },
                None => {
                    coercions.push("verdict missing");
                    Verdict::Uncertain
                }
            };
            Analysis::new(
                verdict,
                remote.confidence.unwrap_or(0.0),
                remote.flagged_ingredients.unwrap_or_default(),
                remote.explanation.unwrap_or_default(),
            )
        }
        None => {
            coercions.push("analysis missing");
            Analysis::uncertain()
        }
    };

    let source_ref = raw
        .source_ref
        .as_deref()
        .and_then(|s| SourceRef::new(s).ok());

    if !coercions.is_empty() {
        warn!(
            owner_id = %owner_id,
            record_id = %id,
            coerced = ?coercions,
            "Normalized partially shaped remote record"
        );
    }

    let metadata = RecordMetadata::new(
        raw.is_favorite.unwrap_or(false),
        true, // exists remotely, therefore persisted
        source_ref,
        last_modified,
    );

    Some(Record::from_parts(
        id,
        owner_id.clone(),
        created_at,
        ingredients,
        analysis,
        metadata,
    ))
}
