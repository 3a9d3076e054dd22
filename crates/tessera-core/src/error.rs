//! Domain error types.

use thiserror::Error;

/// Top-level error type shared by aggregates, repositories and storage ports.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// Optimistic concurrency conflict on a stream append.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream: String,
        /// The version the writer expected.
        expected: i64,
        /// The version found in storage.
        actual: i64,
    },

    /// A business invariant was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A persisted stream cannot be folded into an aggregate.
    #[error("aggregate stream corrupt for {stream}: {reason}")]
    AggregateStreamCorrupt {
        /// The stream that failed to rehydrate.
        stream: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An outbox record with the same message id already exists.
    #[error("outbox already contains message {0}")]
    OutboxAppendConflict(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Stable machine-readable identifier for this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AggregateNotFound(_) => "aggregate_not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::Validation(_) => "validation_error",
            Self::AggregateStreamCorrupt { .. } => "aggregate_stream_corrupt",
            Self::OutboxAppendConflict(_) => "outbox_append_conflict",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }
}
