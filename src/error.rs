//! Error types for coordination recipes.

use snafu::Snafu;
use thiserror::Error;

/// Errors reported by a [`KeyValueStore`](crate::KeyValueStore) implementation.
///
/// Recipes never retry these on their own; the store's `retry` flag is the
/// only retry policy applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store stayed busy longer than its busy timeout.
    #[error("store busy: operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    /// The store cannot be reached.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
    /// Any other failure inside the store.
    #[error("store operation failed: {reason}")]
    Failed { reason: String },
}

impl StoreError {
    /// Whether the failure is transient contention that `retry` would absorb.
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Errors from coordination recipes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinationError {
    /// Release called by a context that does not hold the resource.
    #[snafu(display("{reason} (key '{key}')"))]
    ReleaseWithoutOwnership {
        /// Key of the primitive.
        key: String,
        /// What was violated.
        reason: String,
    },

    /// Underlying storage error.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying error.
        source: StoreError,
    },

    /// Data in storage is corrupted or unparseable.
    #[snafu(display("corrupted data in key '{key}': {reason}"))]
    CorruptedData {
        /// The key with corrupted data.
        key: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// JSON serialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },

    /// Construction parameters are out of range.
    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfig {
        /// Description of the rejected value.
        reason: String,
    },
}

impl From<StoreError> for CoordinationError {
    fn from(source: StoreError) -> Self {
        CoordinationError::Storage { source }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(source: serde_json::Error) -> Self {
        CoordinationError::Serialization { source }
    }
}
