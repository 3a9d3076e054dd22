//! Dispatch error types.

use tessera_core::error::DomainError;
use thiserror::Error;

use crate::message::FieldViolation;

/// Everything that can go wrong while dispatching a command or query.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the message type.
    #[error("no handler registered for {0}")]
    HandlerNotFound(String),

    /// A second handler was registered for a message type.
    #[error("a handler is already registered for {0}")]
    DuplicateRegistration(String),

    /// The message failed validation. Lists every violated field.
    #[error("validation failed: {}", describe(.0))]
    ValidationFailed(Vec<FieldViolation>),

    /// The caller may not perform this action.
    #[error("permission denied for {message_type}: {reason}")]
    PermissionDenied {
        /// Message that was refused.
        message_type: String,
        /// Why it was refused.
        reason: String,
    },

    /// The pipeline did not finish in time.
    #[error("{message_type} timed out after {after_ms}ms")]
    Timeout {
        /// Message that timed out.
        message_type: String,
        /// The configured limit.
        after_ms: u64,
    },

    /// A middleware short-circuited with a value of the wrong type.
    #[error("unexpected result type for {0}")]
    UnexpectedResult(String),

    /// The handler failed with a domain error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DispatchError {
    /// Stable machine-readable identifier for this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandlerNotFound(_) => "handler_not_found",
            Self::DuplicateRegistration(_) => "duplicate_registration",
            Self::ValidationFailed(_) => "validation_failed",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Timeout { .. } => "timeout",
            Self::UnexpectedResult(_) => "unexpected_result",
            Self::Domain(err) => err.kind(),
        }
    }
}
