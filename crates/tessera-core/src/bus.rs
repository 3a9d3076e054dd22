//! Event bus port used by the outbox publisher.

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::IntegrationEventEnvelope;

/// Transport failure while publishing to the bus.
#[derive(Debug, Error)]
#[error("publish of {event_type} failed: {reason}")]
pub struct PublishError {
    /// Event type that could not be published.
    pub event_type: String,
    /// Transport-specific reason.
    pub reason: String,
}

impl PublishError {
    /// Creates a publish error.
    #[must_use]
    pub fn new(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

/// Publish side of a publish/subscribe fan-out.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Hands `envelope` to every subscriber of its event type.
    ///
    /// Subscriber failures are isolated by the bus and do not surface here.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` when the transport itself fails; the caller
    /// retries later.
    async fn publish(&self, envelope: &IntegrationEventEnvelope) -> Result<(), PublishError>;
}
