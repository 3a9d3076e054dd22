//! Aggregate root abstraction.
//!
//! An aggregate's state is a pure fold over its own stream. Business methods
//! validate, then [`raise`](AggregateRoot::raise) exactly one event per
//! meaningful transition; raising applies the event immediately and buffers it
//! until the repository pulls it for persistence.

use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::event_store::StoredEvent;

/// Version bookkeeping and the uncommitted-event buffer shared by all
/// aggregates.
#[derive(Debug, Clone)]
pub struct EventBuffer<E> {
    version: i64,
    committed_version: i64,
    uncommitted: Vec<E>,
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self {
            version: 0,
            committed_version: 0,
            uncommitted: Vec::new(),
        }
    }
}

impl<E: Clone> EventBuffer<E> {
    /// Creates an empty buffer at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events applied, committed or not.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Version of the last persisted event; the next `expected_version`.
    #[must_use]
    pub fn committed_version(&self) -> i64 {
        self.committed_version
    }

    /// Sequence number the next raised event will carry.
    #[must_use]
    pub fn next_sequence_number(&self) -> i64 {
        self.version + 1
    }

    /// Uncommitted events in raise order.
    #[must_use]
    pub fn uncommitted(&self) -> &[E] {
        &self.uncommitted
    }

    fn record(&mut self, event: E) {
        self.version += 1;
        self.uncommitted.push(event);
    }

    fn replayed(&mut self) {
        self.version += 1;
        self.committed_version = self.version;
    }

    fn pull(&mut self) -> Vec<E> {
        self.committed_version = self.version;
        std::mem::take(&mut self.uncommitted)
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Sized + Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Aggregate type name used in stream keys.
    const AGGREGATE_TYPE: &'static str;

    /// Event type that must open every stream of this aggregate.
    const CREATION_EVENT_TYPE: &'static str;

    /// State before the creation event has been applied.
    fn empty(id: &str) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> &str;

    /// Version bookkeeping.
    fn buffer(&self) -> &EventBuffer<Self::Event>;

    /// Mutable version bookkeeping.
    fn buffer_mut(&mut self) -> &mut EventBuffer<Self::Event>;

    /// Folds one event into state. Must be total over every event this
    /// aggregate raises and must not touch the buffer.
    fn apply(&mut self, event: &Self::Event);

    /// Decodes a stored event. Returns `Ok(None)` for event types this
    /// aggregate does not know, so that newer streams stay replayable.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateStreamCorrupt` when a known event type
    /// carries an unreadable payload.
    fn decode(stored: &StoredEvent) -> Result<Option<Self::Event>, DomainError>;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64 {
        self.buffer().version()
    }

    /// Returns the version of the last persisted event.
    fn committed_version(&self) -> i64 {
        self.buffer().committed_version()
    }

    /// Returns a copy of the uncommitted events.
    fn uncommitted_events(&self) -> Vec<Self::Event> {
        self.buffer().uncommitted().to_vec()
    }

    /// Returns and clears the uncommitted events, advancing the committed
    /// version to the current version.
    fn pull_uncommitted_events(&mut self) -> Vec<Self::Event> {
        self.buffer_mut().pull()
    }

    /// Applies a new event and buffers it for persistence.
    fn raise(&mut self, event: Self::Event) {
        self.apply(&event);
        self.buffer_mut().record(event);
    }
}

/// Rebuilds an aggregate from its persisted stream.
///
/// The result has no uncommitted events and its version equals the stream
/// length. Unknown event types count towards the version but do not change
/// state.
///
/// # Errors
///
/// Returns `DomainError::AggregateStreamCorrupt` when the stream is empty,
/// does not open with the creation event, has a gap in its sequence numbers,
/// or holds an unreadable payload.
pub fn rehydrate<A: AggregateRoot>(id: &str, events: &[StoredEvent]) -> Result<A, DomainError> {
    let corrupt = |reason: String| DomainError::AggregateStreamCorrupt {
        stream: format!("{}/{id}", A::AGGREGATE_TYPE),
        reason,
    };

    match events.first() {
        None => return Err(corrupt("stream is empty".to_owned())),
        Some(first) if first.event_type != A::CREATION_EVENT_TYPE => {
            return Err(corrupt(format!(
                "expected {} as first event, found {}",
                A::CREATION_EVENT_TYPE,
                first.event_type
            )));
        }
        Some(_) => {}
    }

    let mut aggregate = A::empty(id);
    for stored in events {
        let expected = aggregate.version() + 1;
        if stored.sequence_number != expected {
            return Err(corrupt(format!(
                "expected sequence number {expected}, found {}",
                stored.sequence_number
            )));
        }
        if let Some(event) = A::decode(stored)? {
            aggregate.apply(&event);
        }
        aggregate.buffer_mut().replayed();
    }
    Ok(aggregate)
}

/// Deserializes the payload of a stored event of a known type.
///
/// # Errors
///
/// Returns `DomainError::AggregateStreamCorrupt` if the payload does not
/// match `T`.
pub fn decode_payload<T: DeserializeOwned>(stored: &StoredEvent) -> Result<T, DomainError> {
    serde_json::from_value(stored.payload.clone()).map_err(|e| {
        DomainError::AggregateStreamCorrupt {
            stream: stored.aggregate_id.clone(),
            reason: format!("cannot decode {}: {e}", stored.event_type),
        }
    })
}
