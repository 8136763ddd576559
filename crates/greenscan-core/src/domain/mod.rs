//! Domain entities and value types
//!
//! Pure business logic with no I/O. Everything here is serde-serializable
//! because the persistence model is complete-snapshot JSON blobs.

pub mod errors;
pub mod newtypes;
pub mod queue_entry;
pub mod record;
pub mod usage;

pub use errors::{DomainError, ErrorClass, RemoteError};
pub use newtypes::{EntryId, OwnerId, RecordId, SourceRef};
pub use queue_entry::{AnalysisRequest, QueueEntry, QueuedOperation};
pub use record::{Analysis, Record, RecordMetadata, Verdict};
pub use usage::{ArchivedPeriod, CounterState, PendingUsage, UsageCounter};
