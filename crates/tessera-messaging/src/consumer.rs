//! Inbox-gated consumption of integration events.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::context::ExecutionContext;
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tessera_core::inbox::Inbox;
use tessera_core::transaction::{TransactionManager, run_in_transaction};
use tracing::{debug, instrument};

use crate::bus::EventHandler;

/// The business effect of consuming one message.
#[async_trait]
pub trait InboxHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Applies the effect of `envelope`. Runs inside the consumer's
    /// transaction; all writes must go through `ctx`.
    ///
    /// # Errors
    ///
    /// Any error rolls the transaction back, leaving the message unprocessed.
    async fn apply(
        &self,
        ctx: &ExecutionContext,
        envelope: &IntegrationEventEnvelope,
    ) -> Result<(), DomainError>;
}

/// What [`InboxConsumer::consume`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The effect was applied and the message recorded.
    Applied,
    /// The message had already been processed; nothing was done.
    Duplicate,
}

/// Wraps an [`InboxHandler`] so that each message id has its effect applied
/// at most once.
pub struct InboxConsumer<H> {
    inbox: Arc<dyn Inbox>,
    transactions: Arc<dyn TransactionManager>,
    handler: H,
}

impl<H: InboxHandler> InboxConsumer<H> {
    /// Creates a consumer.
    pub fn new(
        inbox: Arc<dyn Inbox>,
        transactions: Arc<dyn TransactionManager>,
        handler: H,
    ) -> Self {
        Self {
            inbox,
            transactions,
            handler,
        }
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Applies the effect of `envelope` unless its message id was already
    /// processed.
    ///
    /// The effect and the inbox mark commit in one transaction. The inbox is
    /// checked again inside that transaction and the mark is an idempotent
    /// claim, so of two consumers racing on the same message only one
    /// applies the effect; the other reports `Duplicate`.
    ///
    /// # Errors
    ///
    /// Returns the handler's or the storage's error; the transaction is
    /// rolled back and the message stays unprocessed.
    #[instrument(
        skip_all,
        fields(
            message_id = %envelope.message_id,
            event_type = %envelope.event_type,
            handler = self.handler.name()
        )
    )]
    pub async fn consume(
        &self,
        envelope: &IntegrationEventEnvelope,
    ) -> Result<ConsumeOutcome, DomainError> {
        let ctx = ExecutionContext::new(envelope.identity());
        let message_id = envelope.message_id.as_str();

        if self.inbox.is_processed(&ctx, message_id).await? {
            debug!("message already processed");
            return Ok(ConsumeOutcome::Duplicate);
        }

        let outcome = run_in_transaction(&ctx, self.transactions.as_ref(), |tx_ctx| async move {
            if self.inbox.is_processed(&tx_ctx, message_id).await? {
                return Ok(ConsumeOutcome::Duplicate);
            }
            if !self.inbox.mark_processed(&tx_ctx, message_id).await? {
                return Ok(ConsumeOutcome::Duplicate);
            }
            self.handler.apply(&tx_ctx, envelope).await?;
            Ok(ConsumeOutcome::Applied)
        })
        .await?;

        debug!(?outcome, "message consumed");
        Ok(outcome)
    }
}

#[async_trait]
impl<H: InboxHandler> EventHandler for InboxConsumer<H> {
    fn name(&self) -> &str {
        self.handler.name()
    }

    async fn handle(&self, envelope: &IntegrationEventEnvelope) -> Result<(), DomainError> {
        self.consume(envelope).await.map(|_| ())
    }
}
