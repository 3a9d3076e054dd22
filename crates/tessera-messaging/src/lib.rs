//! Delivery side of the Tessera outbox/inbox pattern.
//!
//! - [`bus`]: in-process publish/subscribe with isolated, concurrent fan-out.
//! - [`publisher`]: drains the outbox onto a bus with exponential backoff.
//! - [`consumer`]: applies a message's effect at most once, gated by the inbox.

pub mod bus;
pub mod consumer;
pub mod publisher;

pub use bus::{EventHandler, InProcessEventBus, Subscription, resolve_event_type};
pub use consumer::{ConsumeOutcome, InboxConsumer, InboxHandler};
pub use publisher::{OutboxPublisher, PublisherConfig, PublisherHandle, TickReport, backoff};
