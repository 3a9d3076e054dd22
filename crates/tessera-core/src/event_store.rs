//! Event store port.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::DomainError;

/// Identifies one append-only stream: `(tenant, aggregate type, aggregate id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    /// Owning tenant; `None` for platform-level streams.
    pub tenant_id: Option<String>,
    /// Aggregate type name, e.g. `"tenant"`.
    pub aggregate_type: String,
    /// Aggregate identifier.
    pub aggregate_id: String,
}

impl StreamKey {
    /// Builds a stream key. A blank tenant id names a platform stream.
    #[must_use]
    pub fn new(
        tenant_id: Option<&str>,
        aggregate_type: &str,
        aggregate_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: non_blank(tenant_id).map(str::to_owned),
            aggregate_type: aggregate_type.to_owned(),
            aggregate_id: aggregate_id.into(),
        }
    }

    /// Owning tenant, with a blank id read as `None`.
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        non_blank(self.tenant_id.as_deref())
    }

    /// This key with a blank tenant id cleared, for use as a storage key.
    #[must_use]
    pub fn canonical(&self) -> Self {
        Self::new(self.tenant(), &self.aggregate_type, self.aggregate_id.clone())
    }
}

fn non_blank(tenant_id: Option<&str>) -> Option<&str> {
    tenant_id.filter(|t| !t.trim().is_empty())
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant().unwrap_or("-"),
            self.aggregate_type,
            self.aggregate_id
        )
    }
}

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version of the payload schema.
    pub schema_version: i32,
    /// Sequence number within the aggregate stream, starting at 1.
    pub sequence_number: i64,
    /// User or system that caused the event.
    pub actor_id: Option<String>,
    /// Request id the event was produced under.
    pub correlation_id: Option<String>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// The persisted events of one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStream {
    /// Events ordered by sequence number.
    pub events: Vec<StoredEvent>,
    /// Number of events in the stream; `0` when nothing was ever written.
    pub current_version: i64,
}

impl EventStream {
    /// Returns `true` when the stream has never been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Arguments of [`EventStore::append_to_stream`].
#[derive(Debug, Clone)]
pub struct AppendToStream {
    /// Target stream.
    pub stream: StreamKey,
    /// Version the writer believes the stream is at.
    pub expected_version: i64,
    /// Events to append, numbered `expected_version + 1 ..`.
    pub events: Vec<StoredEvent>,
    /// Tenant recorded with the write.
    pub tenant_id: Option<String>,
    /// Actor recorded with the write.
    pub actor_id: Option<String>,
}

/// Append-only, per-stream event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the stream has moved
    /// past `expected_version`; the store never merges concurrent writes.
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn append_to_stream(
        &self,
        ctx: &ExecutionContext,
        request: AppendToStream,
    ) -> Result<(), DomainError>;

    /// Loads a whole stream. A stream that was never written is returned empty
    /// at version 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn load_stream(
        &self,
        ctx: &ExecutionContext,
        stream: &StreamKey,
    ) -> Result<EventStream, DomainError>;
}
