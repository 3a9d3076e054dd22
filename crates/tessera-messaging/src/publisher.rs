//! Outbox publisher: moves pending outbox records onto the event bus.
//!
//! Each record is handled on its own: a successful publish marks it
//! published, a failed one stays pending with `attempts + 1` and becomes due
//! again after [`backoff`]. A crash between publishing and marking leads to a
//! second publish on a later tick, which the inbox on the consuming side
//! absorbs.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::bus::EventBus;
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::outbox::{ListPending, MarkFailed, Outbox, OutboxRecord};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Exponent cap: delays stop doubling after `2^10` seconds.
const MAX_BACKOFF_EXPONENT: i32 = 10;
const BASE_BACKOFF_MS: u64 = 1000;

/// Publisher tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Delay between ticks of the background loop.
    pub poll_interval: Duration,
    /// Maximum number of records handled per tick.
    pub batch_size: usize,
    /// Ceiling for the retry delay.
    pub max_backoff: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Retry delay after the `attempts`-th failure:
/// `min(max_backoff, 1s * 2^min(attempts - 1, 10))`.
#[must_use]
pub fn backoff(attempts: i32, max_backoff: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, MAX_BACKOFF_EXPONENT);
    let factor = 1_u64 << u32::try_from(exponent).unwrap_or(0);
    Duration::from_millis(BASE_BACKOFF_MS * factor).min(max_backoff)
}

/// Outcome of one [`OutboxPublisher::tick_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records published and marked.
    pub published: usize,
    /// Records whose publish failed and were rescheduled.
    pub failed: usize,
}

/// Drains the outbox onto an event bus.
#[derive(Clone)]
pub struct OutboxPublisher {
    outbox: Arc<dyn Outbox>,
    bus: Arc<dyn EventBus>,
    clock: SharedClock,
    config: PublisherConfig,
}

impl std::fmt::Debug for OutboxPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxPublisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OutboxPublisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn Outbox>,
        bus: Arc<dyn EventBus>,
        clock: SharedClock,
        config: PublisherConfig,
    ) -> Self {
        Self {
            outbox,
            bus,
            clock,
            config,
        }
    }

    /// The publisher's configuration.
    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publishes every pending record that is due, up to the batch size.
    ///
    /// # Errors
    ///
    /// Returns the outbox error when pending records cannot be listed.
    /// Failures of individual records are recorded on the record and counted
    /// in the report instead.
    #[instrument(skip_all, fields(batch_size = self.config.batch_size))]
    pub async fn tick_once(&self) -> Result<TickReport, DomainError> {
        let ctx = ExecutionContext::system();
        let now = self.clock.now();
        let due = self
            .outbox
            .list_pending(
                &ctx,
                ListPending {
                    now,
                    limit: self.config.batch_size,
                },
            )
            .await?;

        let mut report = TickReport::default();
        for record in due {
            if self.deliver(&ctx, &record).await {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        if report != TickReport::default() {
            debug!(
                published = report.published,
                failed = report.failed,
                "outbox tick finished"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, ctx: &ExecutionContext, record: &OutboxRecord) -> bool {
        let message_id = record.message_id();
        let event_type = record.envelope.event_type.as_str();

        let publish_error = match self.bus.publish(&record.envelope).await {
            Ok(()) => match self.outbox.mark_published(ctx, message_id).await {
                Ok(()) => {
                    debug!(message_id, event_type, "outbox record published");
                    return true;
                }
                Err(err) => {
                    // The envelope went out; it will be published again on a
                    // later tick and deduplicated downstream.
                    error!(message_id, event_type, error = %err, "failed to mark outbox record published");
                    return false;
                }
            },
            Err(err) => err,
        };

        let attempts = record.attempts.saturating_add(1);
        let delay = backoff(attempts, self.config.max_backoff);
        let next_attempt_at = self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
        warn!(
            message_id,
            event_type,
            attempts,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %publish_error,
            "outbox publish failed"
        );

        let failure = MarkFailed {
            message_id: message_id.to_owned(),
            attempts,
            next_attempt_at,
            last_error: publish_error.to_string(),
        };
        if let Err(err) = self.outbox.mark_failed(ctx, failure).await {
            error!(message_id, error = %err, "failed to record outbox publish failure");
        }
        false
    }

    /// Starts the background loop. It ticks every `poll_interval` until
    /// [`PublisherHandle::shutdown`] is called; a tick in progress is allowed
    /// to finish.
    #[must_use]
    pub fn spawn(self) -> PublisherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(self, shutdown_rx));
        PublisherHandle {
            shutdown_tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

async fn run(publisher: OutboxPublisher, mut shutdown_rx: watch::Receiver<bool>) {
    let period = publisher.config.poll_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        poll_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        batch_size = publisher.config.batch_size,
        "outbox publisher started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = publisher.tick_once().await {
                    error!(error = %err, "outbox tick failed");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    info!("outbox publisher stopped");
}

/// Handle to a running publisher loop.
///
/// Dropping the handle does not stop the loop; call
/// [`shutdown`](PublisherHandle::shutdown).
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PublisherHandle {
    /// Signals the loop to stop and waits for it. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when the loop task panicked.
    pub async fn shutdown(&self) -> Result<(), DomainError> {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().await.take();
        match task {
            Some(handle) => handle.await.map_err(|err| {
                DomainError::Infrastructure(format!("outbox publisher task failed: {err}"))
            }),
            None => Ok(()),
        }
    }
}
