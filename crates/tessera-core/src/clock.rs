//! Time source used by aggregates, stores and the outbox publisher.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time so that event timestamps and retry
/// schedules can be pinned in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Shared clock handle as injected into long-lived components.
pub type SharedClock = Arc<dyn Clock>;
