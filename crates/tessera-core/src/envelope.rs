//! Integration event envelope: the wire wrapper for cross-context events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ExecutionContext, Identity};

/// Canonical, versioned wrapper around every event that leaves a bounded
/// context. `message_id` is the idempotency key consumers deduplicate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEventEnvelope {
    /// Globally unique message identifier.
    pub message_id: String,
    /// Event type name used for routing.
    pub event_type: String,
    /// When the underlying change happened.
    pub occurred_at: DateTime<Utc>,
    /// Version of the payload schema.
    pub schema_version: i32,
    /// Tenant the change belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// User who caused the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request the change was made in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Event-specific data.
    pub payload: serde_json::Value,
}

impl IntegrationEventEnvelope {
    /// Wraps `payload` with a fresh message id and the identity of `ctx`.
    #[must_use]
    pub fn new(
        ctx: &ExecutionContext,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        let identity = ctx.identity();
        Self {
            message_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            occurred_at,
            schema_version: 1,
            tenant_id: identity.tenant_id.clone(),
            user_id: identity.user_id.clone(),
            request_id: identity.request_id.clone(),
            payload,
        }
    }

    /// Replaces the generated message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    /// Replaces the schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: i32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Replaces the tenant the event is attributed to.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Identity the envelope was produced under, for the consuming side.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.tenant_id.clone(),
            self.user_id.clone(),
            self.request_id.clone(),
        )
    }
}
