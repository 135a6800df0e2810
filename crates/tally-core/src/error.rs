//! Core error type.
//!
//! Every adapter crate returns `CoreError`; the web crate maps it to HTTP
//! responses in its own `ApiError`.

use thiserror::Error;

use crate::models::metric::MetricKind;

/// Core layer error.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(String),

    /// Field validation failure
    #[error("validation failed ({field}): {message}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// Failure reason
        message: String,
    },

    /// Query for a metric that is in neither namespace (or not in the
    /// requested one)
    #[error("metric not found: {name}")]
    NotFound {
        /// Namespace that was searched, `None` when both were
        kind: Option<MetricKind>,
        /// Metric name
        name: String,
    },

    /// Metric type string that is neither `gauge` nor `counter`
    #[error("unsupported metric kind: {0}")]
    UnsupportedKind(String),

    /// Keyed hash verification failed; the whole batch is rejected
    #[error("integrity hash mismatch for metric {id}")]
    IntegrityMismatch {
        /// Id of the first record that failed verification
        id: String,
    },

    /// Persisted snapshot is missing, unreadable, unparseable or empty
    #[error("snapshot is corrupt or empty: {0}")]
    CorruptOrEmptySnapshot(String),

    /// Restore called without a snapshot
    #[error("restore requires a snapshot")]
    EmptySnapshot,

    /// Backend connection failure (open, ping, closed connection)
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Network error (connect failure, timeout, non-success status)
    #[error("network error: {0}")]
    Network(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal state
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a not-found error scoped to one namespace.
    pub fn not_found(kind: Option<MetricKind>, name: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// `true` for errors caused by the caller's input rather than by the
    /// system (rendered as 4xx by the collector).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation { .. }
                | CoreError::NotFound { .. }
                | CoreError::UnsupportedKind(_)
                | CoreError::IntegrityMismatch { .. }
                | CoreError::Serialization(_)
        )
    }
}
