//! Commands, queries and their handlers.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::context::ExecutionContext;

use crate::error::DispatchError;

/// One rule a message broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldViolation {
    /// Creates a violation.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Object-safe view of a command or query, as seen by middleware.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// Stable routing key, e.g. `"CreateTenant"`.
    fn message_type(&self) -> &'static str;

    /// Checks the message's shape. Returns every violation, not just the
    /// first; an empty list means the message is valid.
    fn validate(&self) -> Vec<FieldViolation> {
        Vec::new()
    }
}

/// A request to change state.
pub trait Command: Message + Clone {
    /// Routing key. Must equal [`Message::message_type`].
    const TYPE: &'static str;
    /// What the handler returns.
    type Output: Send + 'static;
}

/// A request to read state.
pub trait Query: Message + Clone {
    /// Routing key. Must equal [`Message::message_type`].
    const TYPE: &'static str;
    /// What the handler returns.
    type Output: Send + 'static;
}

/// Executes one command type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Handles `command` on behalf of the identity in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError`, usually wrapping a `DomainError`.
    async fn handle(&self, ctx: &ExecutionContext, command: C) -> Result<C::Output, DispatchError>;
}

/// Answers one query type.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    /// Answers `query` on behalf of the identity in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError`, usually wrapping a `DomainError`.
    async fn handle(&self, ctx: &ExecutionContext, query: Q) -> Result<Q::Output, DispatchError>;
}
