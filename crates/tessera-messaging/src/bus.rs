//! In-process event bus.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tessera_core::bus::{EventBus, PublishError};
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tracing::{debug, error, warn};

/// Event type used when neither the envelope nor its payload names one.
pub const UNKNOWN_EVENT_TYPE: &str = "UnknownEvent";

/// A subscriber to one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles one delivered envelope.
    ///
    /// # Errors
    ///
    /// Any error is logged by the bus and goes no further.
    async fn handle(&self, envelope: &IntegrationEventEnvelope) -> Result<(), DomainError>;
}

/// Routing key of `envelope`: its `event_type` when non-blank, else the
/// payload's `"type"` field, else [`UNKNOWN_EVENT_TYPE`].
#[must_use]
pub fn resolve_event_type(envelope: &IntegrationEventEnvelope) -> &str {
    if !envelope.event_type.trim().is_empty() {
        return &envelope.event_type;
    }
    envelope
        .payload
        .get("type")
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(UNKNOWN_EVENT_TYPE)
}

type Handlers = Vec<(u64, Arc<dyn EventHandler>)>;

#[derive(Default)]
struct Registry {
    handlers: RwLock<HashMap<String, Handlers>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, event_type: &str, id: u64) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(event_type) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(event_type);
            }
        }
    }
}

/// Publish/subscribe fan-out inside one process.
///
/// Every subscriber of an event type receives each published envelope of
/// that type. Subscribers run concurrently; an error or panic in one is
/// logged and never reaches the publisher or the other subscribers.
#[derive(Clone, Default)]
pub struct InProcessEventBus {
    registry: Arc<Registry>,
}

impl fmt::Debug for InProcessEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InProcessEventBus")
            .field("event_types", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InProcessEventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type`. The handler stays registered
    /// until the returned [`Subscription`] is disposed.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Subscription {
        let event_type = event_type.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(event_type = %event_type, handler = handler.name(), "subscriber registered");
        self.registry
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.clone())
            .or_default()
            .push((id, handler));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type,
            id,
        }
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Whether `event_type` has a registration at all.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_type)
    }

    fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, envelope: &IntegrationEventEnvelope) -> Result<(), PublishError> {
        let event_type = resolve_event_type(envelope);
        let handlers = self.handlers_for(event_type);
        if handlers.is_empty() {
            debug!(
                message_id = %envelope.message_id,
                event_type,
                "no subscribers for event"
            );
            return Ok(());
        }

        let deliveries = handlers.iter().map(|handler| {
            AssertUnwindSafe(handler.handle(envelope)).catch_unwind()
        });
        let outcomes = join_all(deliveries).await;

        for (handler, outcome) in handlers.iter().zip(outcomes) {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    message_id = %envelope.message_id,
                    event_type,
                    handler = handler.name(),
                    error = %err,
                    "subscriber failed"
                ),
                Err(_) => error!(
                    message_id = %envelope.message_id,
                    event_type,
                    handler = handler.name(),
                    "subscriber panicked"
                ),
            }
        }
        Ok(())
    }
}

/// Registration handle returned by [`InProcessEventBus::subscribe`].
///
/// Dropping it leaves the handler registered; call
/// [`dispose`](Subscription::dispose) to remove it.
#[must_use = "a subscription can only be removed through its handle"]
pub struct Subscription {
    registry: Weak<Registry>,
    event_type: String,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    /// The event type this subscription listens to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Removes exactly this handler. The event type's registration goes away
    /// with its last handler.
    pub fn dispose(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
            debug!(event_type = %self.event_type, "subscriber removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use tessera_core::context::ExecutionContext;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, envelope: &IntegrationEventEnvelope) -> Result<(), DomainError> {
            self.seen.lock().unwrap().push(envelope.message_id.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _envelope: &IntegrationEventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::Infrastructure("projection offline".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        async fn handle(&self, _envelope: &IntegrationEventEnvelope) -> Result<(), DomainError> {
            panic!("subscriber bug");
        }
    }

    fn envelope(event_type: &str, payload: serde_json::Value) -> IntegrationEventEnvelope {
        IntegrationEventEnvelope::new(
            &ExecutionContext::system(),
            event_type,
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            payload,
        )
        .with_message_id("m-1")
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_every_subscriber_of_the_type() {
        // Arrange
        let bus = InProcessEventBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let other = Arc::new(Recorder::default());
        let _a = bus.subscribe("TenantCreated", first.clone());
        let _b = bus.subscribe("TenantCreated", second.clone());
        let _c = bus.subscribe("TenantRenamed", other.clone());

        // Act
        bus.publish(&envelope("TenantCreated", serde_json::json!({})))
            .await
            .unwrap();

        // Assert
        assert_eq!(first.seen(), vec!["m-1"]);
        assert_eq!(second.seen(), vec!["m-1"]);
        assert!(other.seen().is_empty());
    }

    #[tokio::test]
    async fn test_failing_and_panicking_subscribers_are_isolated() {
        // Arrange
        let bus = InProcessEventBus::new();
        let healthy = Arc::new(Recorder::default());
        let _a = bus.subscribe("TenantCreated", Arc::new(Failing));
        let _b = bus.subscribe("TenantCreated", Arc::new(Panicking));
        let _c = bus.subscribe("TenantCreated", healthy.clone());

        // Act
        let result = bus
            .publish(&envelope("TenantCreated", serde_json::json!({})))
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(healthy.seen(), vec!["m-1"]);
    }

    #[tokio::test]
    async fn test_dispose_removes_only_that_handler_and_frees_the_last_registration() {
        // Arrange
        let bus = InProcessEventBus::new();
        let kept = Arc::new(Recorder::default());
        let dropped = Arc::new(Recorder::default());
        let keep = bus.subscribe("TenantCreated", kept.clone());
        let remove = bus.subscribe("TenantCreated", dropped.clone());

        // Act
        remove.dispose();
        bus.publish(&envelope("TenantCreated", serde_json::json!({})))
            .await
            .unwrap();

        // Assert
        assert_eq!(kept.seen().len(), 1);
        assert!(dropped.seen().is_empty());
        assert_eq!(bus.subscriber_count("TenantCreated"), 1);
        keep.dispose();
        assert!(!bus.is_registered("TenantCreated"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let bus = InProcessEventBus::new();

        let result = bus
            .publish(&envelope("Nobody", serde_json::json!({})))
            .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_event_type_falls_back_to_payload_type_then_placeholder() {
        let named = envelope("TenantCreated", serde_json::json!({"type": "Ignored"}));
        let from_payload = envelope("  ", serde_json::json!({"type": "TenantRenamed"}));
        let anonymous = envelope("", serde_json::json!({"name": "Acme"}));

        assert_eq!(resolve_event_type(&named), "TenantCreated");
        assert_eq!(resolve_event_type(&from_payload), "TenantRenamed");
        assert_eq!(resolve_event_type(&anonymous), UNKNOWN_EVENT_TYPE);
    }

    #[tokio::test]
    async fn test_envelope_without_event_type_routes_by_payload_type() {
        let bus = InProcessEventBus::new();
        let recorder = Arc::new(Recorder::default());
        let _s = bus.subscribe("TenantRenamed", recorder.clone());

        bus.publish(&envelope("", serde_json::json!({"type": "TenantRenamed"})))
            .await
            .unwrap();

        assert_eq!(recorder.seen(), vec!["m-1"]);
    }
}
