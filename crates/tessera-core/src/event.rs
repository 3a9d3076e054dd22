//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Position of this event in its stream, starting at 1.
    pub sequence_number: i64,
    /// Version of the payload schema.
    pub schema_version: i32,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Builds metadata for a freshly raised event at schema version 1.
    #[must_use]
    pub fn new(
        event_type: &str,
        aggregate_id: &str,
        sequence_number: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            sequence_number,
            schema_version: 1,
            occurred_at,
        }
    }
}

/// Trait that all domain events implement.
///
/// Events are immutable and self-describing: the type name and schema version
/// travel with the payload so that older streams can still be replayed after
/// the event vocabulary has grown.
pub trait DomainEvent: Send + Sync + Clone + std::fmt::Debug {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}
