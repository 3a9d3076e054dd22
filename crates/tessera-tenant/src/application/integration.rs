//! Integration events the tenant context publishes to other contexts.

use serde_json::json;
use tessera_core::context::ExecutionContext;
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::event::DomainEvent;

use crate::domain::events::{TenantEvent, TenantEventKind};

pub const TENANT_CREATED: &str = "TenantCreated";
pub const TENANT_RENAMED: &str = "TenantRenamed";
pub const TENANT_PLAN_CHANGED: &str = "TenantPlanChanged";
pub const TENANT_SUSPENDED: &str = "TenantSuspended";
pub const TENANT_REACTIVATED: &str = "TenantReactivated";
pub const TENANT_DELETED: &str = "TenantDeleted";

/// Every integration event type this context publishes.
pub const INTEGRATION_EVENT_TYPES: [&str; 6] = [
    TENANT_CREATED,
    TENANT_RENAMED,
    TENANT_PLAN_CHANGED,
    TENANT_SUSPENDED,
    TENANT_REACTIVATED,
    TENANT_DELETED,
];

/// Wraps a domain event for the outbox.
///
/// The message id is the domain event id, so mapping the same event twice
/// yields the same message. The envelope is attributed to the tenant the
/// event is about. Every payload carries the event's position in its stream
/// as `version`, so consumers can restore per-tenant order.
#[must_use]
pub fn to_envelope(ctx: &ExecutionContext, event: &TenantEvent) -> IntegrationEventEnvelope {
    let (event_type, tenant_id, mut payload) = match &event.kind {
        TenantEventKind::TenantCreated(e) => (
            TENANT_CREATED,
            &e.tenant_id,
            json!({"type": TENANT_CREATED, "tenantId": e.tenant_id, "name": e.name, "plan": e.plan}),
        ),
        TenantEventKind::TenantRenamed(e) => (
            TENANT_RENAMED,
            &e.tenant_id,
            json!({"type": TENANT_RENAMED, "tenantId": e.tenant_id, "name": e.name}),
        ),
        TenantEventKind::TenantPlanChanged(e) => (
            TENANT_PLAN_CHANGED,
            &e.tenant_id,
            json!({"type": TENANT_PLAN_CHANGED, "tenantId": e.tenant_id, "plan": e.plan}),
        ),
        TenantEventKind::TenantSuspended(e) => (
            TENANT_SUSPENDED,
            &e.tenant_id,
            json!({"type": TENANT_SUSPENDED, "tenantId": e.tenant_id, "reason": e.reason}),
        ),
        TenantEventKind::TenantReactivated(e) => (
            TENANT_REACTIVATED,
            &e.tenant_id,
            json!({"type": TENANT_REACTIVATED, "tenantId": e.tenant_id}),
        ),
        TenantEventKind::TenantDeleted(e) => (
            TENANT_DELETED,
            &e.tenant_id,
            json!({"type": TENANT_DELETED, "tenantId": e.tenant_id}),
        ),
    };
    let meta = event.metadata();
    payload["version"] = json!(meta.sequence_number);
    IntegrationEventEnvelope::new(ctx, event_type, meta.occurred_at, payload)
        .with_message_id(meta.event_id.to_string())
        .with_schema_version(meta.schema_version)
        .with_tenant_id(tenant_id.clone())
}
