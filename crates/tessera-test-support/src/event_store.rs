//! Test event stores.

use async_trait::async_trait;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::event_store::{AppendToStream, EventStore, EventStream, StreamKey};

/// An event store that always returns an infrastructure error. Useful for
/// testing error-handling and rollback paths.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append_to_stream(
        &self,
        _ctx: &ExecutionContext,
        _request: AppendToStream,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn load_stream(
        &self,
        _ctx: &ExecutionContext,
        _stream: &StreamKey,
    ) -> Result<EventStream, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
