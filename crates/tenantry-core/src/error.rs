//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The version the writer based its facts on.
        expected: i64,
        /// The version actually found in the log.
        actual: i64,
    },

    /// Malformed input, including malformed append batches.
    #[error("validation error: {0}")]
    Validation(String),

    /// Stored history that cannot be legally folded or decoded.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Transient storage or transport failure.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl DomainError {
    /// Returns `true` when the caller may reload state and resubmit.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
