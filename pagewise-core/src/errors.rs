//! Error types for pagewise-core
//!
//! Every fallible operation in the crate returns [`ContextError`]. The
//! variants follow the failure classes the extension has to deal with:
//! bad input, provider/network trouble, storage trouble and cancellation.

use thiserror::Error;

/// Storage-level failures reported by a [`crate::storage::KeyValueStore`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend refused the write because it would exceed its quota
    #[error("Storage quota exceeded: {used} of {limit} bytes")]
    QuotaExceeded {
        /// Bytes the store would hold after the write
        used: usize,
        /// Configured quota in bytes
        limit: usize,
    },

    /// The backend could not be reached or failed mid-operation
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be decoded
    #[error("Corrupt storage entry for key {key}: {reason}")]
    Corrupt {
        /// Key holding the corrupt entry
        key: String,
        /// Decoder message
        reason: String,
    },

    /// File-system level error
    #[error("Storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Main error type for pagewise-core
#[derive(Error, Debug)]
pub enum ContextError {
    /// Invalid settings or arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport-level failure talking to a provider
    #[error("Network error: {0}")]
    Network(String),

    /// Provider answered with a non-success status
    #[error("Provider returned status {status}: {message}")]
    Provider {
        /// HTTP-like status code
        status: u16,
        /// Provider message
        message: String,
    },

    /// An operation ran past its deadline
    #[error("Timeout after {millis}ms")]
    Timeout {
        /// Elapsed milliseconds
        millis: u64,
    },

    /// Key/value storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The summarizer produced no usable summary
    #[error("Summarization failed: {0}")]
    Summarization(String),

    /// A newer value already exists in storage
    #[error("Write conflict on key {key}")]
    Conflict {
        /// Key that conflicted
        key: String,
    },

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl ContextError {
    /// Whether a retry with backoff can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ContextError::Network(_) | ContextError::Timeout { .. } => true,
            ContextError::Provider { status, .. } => *status == 429 || *status >= 500,
            ContextError::Storage(StorageError::QuotaExceeded { .. }) => false,
            ContextError::Storage(StorageError::Corrupt { .. }) => false,
            ContextError::Storage(_) => true,
            _ => false,
        }
    }

    /// Cancellation is a terminal state, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContextError::Cancelled)
    }
}

/// Result type alias for pagewise-core
pub type Result<T> = std::result::Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ContextError::Network("reset".into()).is_retryable());
        assert!(ContextError::Timeout { millis: 10 }.is_retryable());
        assert!(
            ContextError::Provider {
                status: 503,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(
            !ContextError::Provider {
                status: 401,
                message: "unauthorized".into()
            }
            .is_retryable()
        );
        assert!(ContextError::Storage(StorageError::Unavailable("busy".into())).is_retryable());
        assert!(
            !ContextError::Storage(StorageError::QuotaExceeded {
                used: 10,
                limit: 5
            })
            .is_retryable()
        );
        assert!(!ContextError::Validation("bad".into()).is_retryable());
        assert!(!ContextError::Cancelled.is_retryable());
    }

    #[test]
    fn test_cancelled_is_not_a_failure_class() {
        assert!(ContextError::Cancelled.is_cancelled());
        assert!(!ContextError::Network("x".into()).is_cancelled());
    }
}
