//! Event-sourced aggregate repository.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::aggregate::{AggregateRoot, rehydrate};
use crate::context::ExecutionContext;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::event_store::{AppendToStream, EventStore, StoredEvent, StreamKey};

/// Loads and saves one aggregate type through an [`EventStore`].
pub struct EventSourcedRepository<A> {
    store: Arc<dyn EventStore>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for EventSourcedRepository<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _aggregate: PhantomData,
        }
    }
}

impl<A: AggregateRoot> EventSourcedRepository<A> {
    /// Creates a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    /// Stream key for aggregate `id` owned by `tenant_id`.
    #[must_use]
    pub fn stream_key(tenant_id: Option<&str>, id: &str) -> StreamKey {
        StreamKey::new(tenant_id, A::AGGREGATE_TYPE, id)
    }

    /// Loads an aggregate, or `None` when its stream is empty.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateStreamCorrupt` when the stream cannot be
    /// replayed, or the store's error on storage failure.
    pub async fn load(
        &self,
        ctx: &ExecutionContext,
        stream: &StreamKey,
    ) -> Result<Option<A>, DomainError> {
        let loaded = self.store.load_stream(ctx, stream).await?;
        if loaded.is_empty() {
            return Ok(None);
        }
        rehydrate(&stream.aggregate_id, &loaded.events).map(Some)
    }

    /// Loads an aggregate that must exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` when the stream is empty.
    pub async fn get(&self, ctx: &ExecutionContext, stream: &StreamKey) -> Result<A, DomainError> {
        self.load(ctx, stream)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound(stream.aggregate_id.clone()))
    }

    /// Persists the aggregate's uncommitted events and returns them as stored.
    ///
    /// Nothing is written when there are no uncommitted events. The events
    /// stay buffered on the aggregate until the append succeeds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when another writer appended
    /// to the stream since the aggregate was loaded.
    pub async fn save(
        &self,
        ctx: &ExecutionContext,
        stream: &StreamKey,
        aggregate: &mut A,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let expected_version = aggregate.committed_version();
        let events = aggregate.uncommitted_events();
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let stored: Vec<StoredEvent> = events.iter().map(|e| to_stored_event(ctx, e)).collect();
        self.store
            .append_to_stream(
                ctx,
                AppendToStream {
                    stream: stream.clone(),
                    expected_version,
                    events: stored.clone(),
                    tenant_id: ctx.tenant_id().map(str::to_owned),
                    actor_id: ctx.user_id().map(str::to_owned),
                },
            )
            .await?;
        aggregate.pull_uncommitted_events();
        Ok(stored)
    }
}

/// Converts a domain event into its stored form, stamping identity from the
/// context.
#[must_use]
pub fn to_stored_event<E: DomainEvent>(ctx: &ExecutionContext, event: &E) -> StoredEvent {
    let meta = event.metadata();
    StoredEvent {
        event_id: meta.event_id,
        aggregate_id: meta.aggregate_id.clone(),
        event_type: event.event_type().to_owned(),
        payload: event.to_payload(),
        schema_version: meta.schema_version,
        sequence_number: meta.sequence_number,
        actor_id: ctx.user_id().map(str::to_owned),
        correlation_id: ctx.request_id().map(str::to_owned),
        occurred_at: meta.occurred_at,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::aggregate::tests::Counter;
    use crate::context::Identity;
    use crate::event_store::EventStream;

    /// Version-checked store that can be told to reject its next append.
    #[derive(Default)]
    struct ScriptedStore {
        streams: Mutex<HashMap<StreamKey, Vec<StoredEvent>>>,
        reject_next: AtomicBool,
    }

    #[async_trait]
    impl EventStore for ScriptedStore {
        async fn append_to_stream(
            &self,
            _ctx: &ExecutionContext,
            request: AppendToStream,
        ) -> Result<(), DomainError> {
            let mut streams = self.streams.lock().unwrap();
            let stream = streams.entry(request.stream.clone()).or_default();
            let actual = i64::try_from(stream.len()).unwrap();
            if self.reject_next.swap(false, Ordering::SeqCst) || actual != request.expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    stream: request.stream.to_string(),
                    expected: request.expected_version,
                    actual,
                });
            }
            stream.extend(request.events);
            Ok(())
        }

        async fn load_stream(
            &self,
            _ctx: &ExecutionContext,
            stream: &StreamKey,
        ) -> Result<EventStream, DomainError> {
            let events = self
                .streams
                .lock()
                .unwrap()
                .get(stream)
                .cloned()
                .unwrap_or_default();
            let current_version = i64::try_from(events.len()).unwrap();
            Ok(EventStream {
                events,
                current_version,
            })
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Identity::new(None, Some("u-1".into()), None))
    }

    #[tokio::test]
    async fn test_save_persists_and_commits_buffered_events() {
        // Arrange
        let store = Arc::new(ScriptedStore::default());
        let repo = EventSourcedRepository::<Counter>::new(store.clone());
        let stream = EventSourcedRepository::<Counter>::stream_key(None, "c-1");
        let mut counter = Counter::open("c-1");
        counter.bump(2);

        // Act
        let stored = repo.save(&ctx(), &stream, &mut counter).await.unwrap();

        // Assert
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].actor_id.as_deref(), Some("u-1"));
        assert!(counter.uncommitted_events().is_empty());
        assert_eq!(counter.committed_version(), 2);
        assert_eq!(store.load_stream(&ctx(), &stream).await.unwrap().current_version, 2);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_events_buffered_for_retry() {
        // Arrange
        let store = Arc::new(ScriptedStore::default());
        store.reject_next.store(true, Ordering::SeqCst);
        let repo = EventSourcedRepository::<Counter>::new(store.clone());
        let stream = EventSourcedRepository::<Counter>::stream_key(None, "c-1");
        let mut counter = Counter::open("c-1");
        counter.bump(5);

        // Act
        let first = repo.save(&ctx(), &stream, &mut counter).await;
        let pending_after_failure = counter.uncommitted_events().len();
        let committed_after_failure = counter.committed_version();
        let retried = repo.save(&ctx(), &stream, &mut counter).await.unwrap();

        // Assert
        assert!(matches!(first, Err(DomainError::ConcurrencyConflict { .. })));
        assert_eq!(pending_after_failure, 2);
        assert_eq!(committed_after_failure, 0);
        assert_eq!(retried.len(), 2);
        assert_eq!(counter.committed_version(), 2);
        let reloaded: Counter = repo.get(&ctx(), &stream).await.unwrap();
        assert_eq!(reloaded.version(), 2);
    }

    #[tokio::test]
    async fn test_save_without_changes_writes_nothing() {
        let store = Arc::new(ScriptedStore::default());
        let repo = EventSourcedRepository::<Counter>::new(store.clone());
        let stream = EventSourcedRepository::<Counter>::stream_key(None, "c-1");
        let mut counter = Counter::open("c-1");
        repo.save(&ctx(), &stream, &mut counter).await.unwrap();

        let stored = repo.save(&ctx(), &stream, &mut counter).await.unwrap();

        assert!(stored.is_empty());
        assert_eq!(store.load_stream(&ctx(), &stream).await.unwrap().current_version, 1);
    }
}
