//! Shared test doubles for the Tessera platform.

mod bus;
mod clock;
mod event_store;

pub use bus::{FailingEventBus, RecordingEventBus};
pub use clock::{FixedClock, ManualClock};
pub use event_store::FailingEventStore;
