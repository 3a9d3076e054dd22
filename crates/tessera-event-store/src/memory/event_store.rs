use async_trait::async_trait;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::event_store::{AppendToStream, EventStore, EventStream, StreamKey};
use tracing::debug;

use super::{MemoryDatabase, stream_len};

/// [`EventStore`] over a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct InMemoryEventStore {
    db: MemoryDatabase,
}

impl InMemoryEventStore {
    pub(crate) fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_to_stream(
        &self,
        ctx: &ExecutionContext,
        request: AppendToStream,
    ) -> Result<(), DomainError> {
        let AppendToStream {
            stream,
            expected_version,
            events,
            actor_id,
            ..
        } = request;
        if events.is_empty() {
            return Ok(());
        }
        let count = events.len();
        let stream = stream.canonical();
        let label = stream.to_string();

        self.db
            .with_state(ctx, move |state| {
                let existing = state.streams.entry(stream).or_default();
                let actual = stream_len(existing);
                if actual != expected_version {
                    return Err(DomainError::ConcurrencyConflict {
                        stream: label,
                        expected: expected_version,
                        actual,
                    });
                }

                let mut next = expected_version;
                let mut staged = Vec::with_capacity(events.len());
                for mut event in events {
                    next += 1;
                    if event.sequence_number != next {
                        return Err(DomainError::Validation(format!(
                            "event {} on stream {label} has sequence number {}, expected {next}",
                            event.event_id, event.sequence_number
                        )));
                    }
                    if event.actor_id.is_none() {
                        event.actor_id.clone_from(&actor_id);
                    }
                    staged.push(event);
                }
                existing.extend(staged);
                debug!(stream = %label, appended = count, version = next, "events appended");
                Ok(())
            })
            .await
    }

    async fn load_stream(
        &self,
        ctx: &ExecutionContext,
        stream: &StreamKey,
    ) -> Result<EventStream, DomainError> {
        self.db
            .with_state(ctx, |state| {
                let events = state
                    .streams
                    .get(&stream.canonical())
                    .cloned()
                    .unwrap_or_default();
                Ok(EventStream {
                    current_version: stream_len(&events),
                    events,
                })
            })
            .await
    }
}
