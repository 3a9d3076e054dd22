//! Inbox port: consumer-side deduplication of integration events.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::DomainError;

/// Durable record of which messages already had their effect applied.
///
/// `mark_processed` must commit in the same transaction as the effect it
/// guards, so that "effect applied" and "marked processed" never diverge.
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Returns `true` when `message_id` has been processed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn is_processed(&self, ctx: &ExecutionContext, message_id: &str)
    -> Result<bool, DomainError>;

    /// Records `message_id` as processed. A duplicate insert is a no-op, not
    /// an error; the return value tells whether this call inserted the row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn mark_processed(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<bool, DomainError>;
}
