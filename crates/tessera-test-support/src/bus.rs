//! Test event buses.

use std::sync::Mutex;

use async_trait::async_trait;
use tessera_core::bus::{EventBus, PublishError};
use tessera_core::envelope::IntegrationEventEnvelope;

/// An event bus that records every envelope it is asked to publish.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<IntegrationEventEnvelope>>,
}

impl RecordingEventBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<IntegrationEventEnvelope> {
        self.published.lock().unwrap().clone()
    }

    /// Message ids published so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_ids(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message_id.clone())
            .collect()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, envelope: &IntegrationEventEnvelope) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// An event bus whose transport fails. It fails every call, or only the
/// first `n` calls when built with [`FailingEventBus::times`], and records
/// the envelopes it accepted afterwards.
#[derive(Debug)]
pub struct FailingEventBus {
    remaining_failures: Mutex<Option<usize>>,
    attempts: Mutex<usize>,
    delivered: RecordingEventBus,
}

impl FailingEventBus {
    /// A bus that never delivers.
    #[must_use]
    pub fn always() -> Self {
        Self {
            remaining_failures: Mutex::new(None),
            attempts: Mutex::new(0),
            delivered: RecordingEventBus::new(),
        }
    }

    /// A bus that fails the first `n` publishes and then delivers.
    #[must_use]
    pub fn times(n: usize) -> Self {
        Self {
            remaining_failures: Mutex::new(Some(n)),
            attempts: Mutex::new(0),
            delivered: RecordingEventBus::new(),
        }
    }

    /// Total publish calls, failed or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Envelopes delivered once the failures ran out.
    pub fn delivered(&self) -> Vec<IntegrationEventEnvelope> {
        self.delivered.published()
    }
}

#[async_trait]
impl EventBus for FailingEventBus {
    async fn publish(&self, envelope: &IntegrationEventEnvelope) -> Result<(), PublishError> {
        *self.attempts.lock().unwrap() += 1;
        let fail = {
            let mut remaining = self.remaining_failures.lock().unwrap();
            match remaining.as_mut() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        };
        if fail {
            return Err(PublishError::new(&envelope.event_type, "broker unavailable"));
        }
        self.delivered.publish(envelope).await
    }
}
