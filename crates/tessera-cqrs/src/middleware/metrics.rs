//! Dispatch metrics.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::context::{CqrsExecutionContext, MessageKind};
use crate::error::DispatchError;
use crate::pipeline::{Middleware, Next, Output};

/// Result of one dispatch as seen by a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    Success,
    /// Failure, labelled with [`DispatchError::kind`].
    Error(&'static str),
}

/// Receives one observation per dispatch.
pub trait MetricsCollector: Send + Sync {
    fn record(
        &self,
        kind: MessageKind,
        message_type: &'static str,
        outcome: DispatchOutcome,
        duration: Duration,
    );
}

/// Emits each observation as a `tracing` event on `tessera::metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsCollector;

impl MetricsCollector for TracingMetricsCollector {
    fn record(
        &self,
        kind: MessageKind,
        message_type: &'static str,
        outcome: DispatchOutcome,
        duration: Duration,
    ) {
        let (outcome, error_kind) = match outcome {
            DispatchOutcome::Success => ("success", None),
            DispatchOutcome::Error(kind) => ("error", Some(kind)),
        };
        info!(
            target: "tessera::metrics",
            kind = kind.as_str(),
            message_type,
            outcome,
            error_kind,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "dispatch observed"
        );
    }
}

type CounterKey = (&'static str, DispatchOutcome);

#[derive(Default)]
struct Recorded {
    counters: HashMap<CounterKey, u64>,
    durations: HashMap<&'static str, Vec<Duration>>,
}

/// Keeps counters and durations in memory, for tests and diagnostics.
#[derive(Clone, Default)]
pub struct InMemoryMetricsCollector {
    recorded: Arc<Mutex<Recorded>>,
}

impl fmt::Debug for InMemoryMetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricsCollector").finish_non_exhaustive()
    }
}

impl InMemoryMetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches of `message_type` that ended in `outcome`.
    #[must_use]
    pub fn count(&self, message_type: &str, outcome: DispatchOutcome) -> u64 {
        let recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        recorded
            .counters
            .iter()
            .filter(|((t, o), _)| *t == message_type && *o == outcome)
            .map(|(_, n)| *n)
            .sum()
    }

    /// Every recorded duration of `message_type`, in recording order.
    #[must_use]
    pub fn durations(&self, message_type: &str) -> Vec<Duration> {
        let recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        recorded
            .durations
            .get(message_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn record(
        &self,
        _kind: MessageKind,
        message_type: &'static str,
        outcome: DispatchOutcome,
        duration: Duration,
    ) {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        *recorded.counters.entry((message_type, outcome)).or_default() += 1;
        recorded
            .durations
            .entry(message_type)
            .or_default()
            .push(duration);
    }
}

/// Reports duration and outcome of each dispatch to a collector.
#[derive(Clone)]
pub struct MetricsMiddleware {
    collector: Arc<dyn MetricsCollector>,
}

impl fmt::Debug for MetricsMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsMiddleware").finish_non_exhaustive()
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(TracingMetricsCollector))
    }
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(
        &self,
        ctx: &mut CqrsExecutionContext,
        next: Next<'_>,
    ) -> Result<Output, DispatchError> {
        let result = next.run(ctx).await;
        let outcome = match &result {
            Ok(_) => DispatchOutcome::Success,
            Err(err) => DispatchOutcome::Error(err.kind()),
        };
        self.collector
            .record(ctx.kind(), ctx.message_type(), outcome, ctx.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::context::{ExecutionContext, Identity};
    use tessera_core::error::DomainError;

    use super::*;
    use crate::bus::CommandBus;
    use crate::message::{Command, CommandHandler, Message};
    use crate::pipeline::Pipeline;

    #[derive(Debug, Clone)]
    struct ShipOrder {
        in_stock: bool,
    }

    impl Message for ShipOrder {
        fn message_type(&self) -> &'static str {
            Self::TYPE
        }
    }

    impl Command for ShipOrder {
        const TYPE: &'static str = "ShipOrder";
        type Output = ();
    }

    struct Handler;

    #[async_trait]
    impl CommandHandler<ShipOrder> for Handler {
        async fn handle(
            &self,
            _ctx: &ExecutionContext,
            command: ShipOrder,
        ) -> Result<(), DispatchError> {
            if command.in_stock {
                Ok(())
            } else {
                Err(DomainError::AggregateNotFound("order o-1".into()).into())
            }
        }
    }

    #[tokio::test]
    async fn test_each_dispatch_is_counted_by_outcome() {
        // Arrange
        let collector = InMemoryMetricsCollector::new();
        let pipeline = Pipeline::builder()
            .with(MetricsMiddleware::new(Arc::new(collector.clone())))
            .build();
        let mut bus = CommandBus::new(pipeline);
        bus.register::<ShipOrder, _>(Handler).unwrap();
        let ctx = ExecutionContext::new(Identity::default());

        // Act
        bus.execute(&ctx, ShipOrder { in_stock: true }).await.unwrap();
        bus.execute(&ctx, ShipOrder { in_stock: true }).await.unwrap();
        let _ = bus.execute(&ctx, ShipOrder { in_stock: false }).await;

        // Assert
        assert_eq!(collector.count("ShipOrder", DispatchOutcome::Success), 2);
        assert_eq!(
            collector.count(
                "ShipOrder",
                DispatchOutcome::Error("aggregate_not_found")
            ),
            1
        );
        assert_eq!(collector.durations("ShipOrder").len(), 3);
    }

    #[test]
    fn test_unknown_message_type_has_no_observations() {
        let collector = InMemoryMetricsCollector::new();

        assert_eq!(collector.count("Nothing", DispatchOutcome::Success), 0);
        assert!(collector.durations("Nothing").is_empty());
    }
}
