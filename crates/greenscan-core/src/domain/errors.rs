//! Domain and remote error types
//!
//! Two error families live here:
//!
//! - [`DomainError`]: validation failures raised when constructing domain
//!   values (invalid identifiers, out-of-range fields).
//! - [`RemoteError`]: everything the remote backend can report. This is the
//!   taxonomy the retry executor classifies; [`RemoteError::is_retryable`] is
//!   the single source of truth for that classification and must never be
//!   duplicated at call sites.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid identifier format
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Owner identifier was empty or malformed
    #[error("Invalid owner ID: {0}")]
    InvalidOwner(String),

    /// Source reference was empty or malformed
    #[error("Invalid source reference: {0}")]
    InvalidSourceRef(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

// ============================================================================
// RemoteError taxonomy
// ============================================================================

/// Classification of a [`RemoteError`] for retry handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: the same call may succeed shortly; retry with backoff
    Retryable,
    /// Permanent: further retries will never succeed; surface to the caller
    Terminal,
}

/// Errors reported by the remote backend
///
/// Adapters map transport and HTTP failures into these variants; everything
/// above the adapter reasons about this taxonomy, never about status codes
/// or transport details.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No connectivity, DNS failure, connection reset and similar
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out before a response arrived
    #[error("request timed out")]
    Timeout,

    /// Explicit overload or rate-limit signal from the service (429/5xx)
    #[error("remote service overloaded or rate limited")]
    Overloaded {
        /// Server-suggested wait, from a Retry-After header when present
        retry_after: Option<Duration>,
    },

    /// The owner's analysis quota for the current period is spent
    #[error("analysis quota exceeded for this period")]
    QuotaExceeded,

    /// Malformed request payload or an unparseable response body
    #[error("validation failed: {0}")]
    Validation(String),

    /// Residual bucket for other definitive API failures
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code reported by the service
        status: u16,
        /// Error message from the response body, if any
        message: String,
    },
}

impl RemoteError {
    /// Classifies this error as retryable or terminal
    ///
    /// This is the one classification function in the system. Network
    /// failures, timeouts and overload signals are worth retrying with
    /// backoff; quota, validation and residual API errors are not, since
    /// repeating the identical request cannot change their outcome.
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout | RemoteError::Overloaded { .. } => {
                ErrorClass::Retryable
            }
            RemoteError::QuotaExceeded | RemoteError::Validation(_) | RemoteError::Api { .. } => {
                ErrorClass::Terminal
            }
        }
    }

    /// Convenience wrapper around [`RemoteError::class`]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Short stable label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Network(_) => "network",
            RemoteError::Timeout => "timeout",
            RemoteError::Overloaded { .. } => "overloaded",
            RemoteError::QuotaExceeded => "quota_exceeded",
            RemoteError::Validation(_) => "validation",
            RemoteError::Api { .. } => "api",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_timeout_are_retryable() {
        assert!(RemoteError::Network("connection refused".into()).is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
    }

    #[test]
    fn test_overload_is_retryable_with_and_without_hint() {
        assert!(RemoteError::Overloaded { retry_after: None }.is_retryable());
        assert!(RemoteError::Overloaded {
            retry_after: Some(Duration::from_secs(30))
        }
        .is_retryable());
    }

    #[test]
    fn test_quota_exceeded_is_terminal() {
        assert_eq!(RemoteError::QuotaExceeded.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_validation_and_api_are_terminal() {
        assert!(!RemoteError::Validation("bad shape".into()).is_retryable());
        assert!(!RemoteError::Api {
            status: 404,
            message: "not found".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RemoteError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "api error (500): boom");
        assert_eq!(RemoteError::Timeout.to_string(), "request timed out");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(RemoteError::Timeout.kind(), "timeout");
        assert_eq!(RemoteError::QuotaExceeded.kind(), "quota_exceeded");
    }

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::InvalidOwner("empty".to_string());
        assert_eq!(err.to_string(), "Invalid owner ID: empty");
    }
}
