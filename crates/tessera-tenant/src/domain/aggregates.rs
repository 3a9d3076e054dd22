//! Aggregate roots for the tenant context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::aggregate::{AggregateRoot, EventBuffer, decode_payload};
use tessera_core::clock::Clock;
use tessera_core::error::DomainError;
use tessera_core::event::EventMetadata;
use tessera_core::event_store::StoredEvent;

use crate::domain::events::{
    TENANT_CREATED, TENANT_DELETED, TENANT_PLAN_CHANGED, TENANT_REACTIVATED, TENANT_RENAMED,
    TENANT_SUSPENDED, TenantCreated, TenantDeleted, TenantEvent, TenantEventKind, TenantPlan,
    TenantPlanChanged, TenantReactivated, TenantRenamed, TenantSuspended,
};

/// Longest accepted tenant name, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// Lifecycle state of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

/// Trims `name` and checks it is non-empty and not too long.
///
/// # Errors
///
/// Returns `DomainError::Validation` when the name is unusable.
pub fn normalize_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation("tenant name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "tenant name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Read model of one tenant, as returned by commands and `GetTenant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub id: String,
    pub name: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    /// Number of events in the tenant's stream.
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The aggregate root for a tenant.
///
/// Setters are idempotent: a change to the current value raises no event.
#[derive(Debug)]
pub struct Tenant {
    id: String,
    name: String,
    plan: TenantPlan,
    status: TenantStatus,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    buffer: EventBuffer<TenantEvent>,
}

impl Tenant {
    /// Creates a new tenant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when `name` is unusable.
    pub fn create(
        id: &str,
        name: &str,
        plan: TenantPlan,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let name = normalize_name(name)?;
        let mut tenant = Self::empty(id);
        tenant.emit(
            TenantEventKind::TenantCreated(TenantCreated {
                tenant_id: id.to_owned(),
                name,
                plan,
            }),
            clock,
        );
        Ok(tenant)
    }

    /// Renames the tenant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the tenant is deleted or the
    /// name is unusable.
    pub fn rename(&mut self, name: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        let name = normalize_name(name)?;
        if name == self.name {
            return Ok(());
        }
        self.emit(
            TenantEventKind::TenantRenamed(TenantRenamed {
                tenant_id: self.id.clone(),
                name,
            }),
            clock,
        );
        Ok(())
    }

    /// Moves the tenant to `plan`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the tenant is deleted.
    pub fn change_plan(&mut self, plan: TenantPlan, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        if plan == self.plan {
            return Ok(());
        }
        self.emit(
            TenantEventKind::TenantPlanChanged(TenantPlanChanged {
                tenant_id: self.id.clone(),
                plan,
            }),
            clock,
        );
        Ok(())
    }

    /// Suspends an active tenant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the tenant is deleted.
    pub fn suspend(&mut self, reason: Option<String>, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        if self.status == TenantStatus::Suspended {
            return Ok(());
        }
        self.emit(
            TenantEventKind::TenantSuspended(TenantSuspended {
                tenant_id: self.id.clone(),
                reason,
            }),
            clock,
        );
        Ok(())
    }

    /// Reactivates a suspended tenant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the tenant is deleted.
    pub fn reactivate(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        if self.status == TenantStatus::Active {
            return Ok(());
        }
        self.emit(
            TenantEventKind::TenantReactivated(TenantReactivated {
                tenant_id: self.id.clone(),
            }),
            clock,
        );
        Ok(())
    }

    /// Soft deletes the tenant. Deleting twice is a no-op.
    pub fn delete(&mut self, clock: &dyn Clock) {
        if self.status == TenantStatus::Deleted {
            return;
        }
        self.emit(
            TenantEventKind::TenantDeleted(TenantDeleted {
                tenant_id: self.id.clone(),
            }),
            clock,
        );
    }

    /// Snapshot of the current state, including uncommitted changes.
    #[must_use]
    pub fn view(&self) -> TenantView {
        TenantView {
            id: self.id.clone(),
            name: self.name.clone(),
            plan: self.plan,
            status: self.status,
            version: self.version(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn plan(&self) -> TenantPlan {
        self.plan
    }

    #[must_use]
    pub fn status(&self) -> TenantStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.status == TenantStatus::Deleted {
            return Err(DomainError::Validation(format!(
                "tenant {} is deleted",
                self.id
            )));
        }
        Ok(())
    }

    fn emit(&mut self, kind: TenantEventKind, clock: &dyn Clock) {
        let event = TenantEvent {
            metadata: EventMetadata::new(
                kind.event_type(),
                &self.id,
                self.buffer.next_sequence_number(),
                clock.now(),
            ),
            kind,
        };
        self.raise(event);
    }
}

impl AggregateRoot for Tenant {
    type Event = TenantEvent;
    const AGGREGATE_TYPE: &'static str = "tenant";
    const CREATION_EVENT_TYPE: &'static str = TENANT_CREATED;

    fn empty(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: String::new(),
            plan: TenantPlan::Free,
            status: TenantStatus::Active,
            created_at: None,
            updated_at: None,
            buffer: EventBuffer::new(),
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn buffer(&self) -> &EventBuffer<TenantEvent> {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut EventBuffer<TenantEvent> {
        &mut self.buffer
    }

    fn apply(&mut self, event: &TenantEvent) {
        let at = event.metadata.occurred_at;
        match &event.kind {
            TenantEventKind::TenantCreated(e) => {
                self.name.clone_from(&e.name);
                self.plan = e.plan;
                self.status = TenantStatus::Active;
                self.created_at = Some(at);
            }
            TenantEventKind::TenantRenamed(e) => self.name.clone_from(&e.name),
            TenantEventKind::TenantPlanChanged(e) => self.plan = e.plan,
            TenantEventKind::TenantSuspended(_) => self.status = TenantStatus::Suspended,
            TenantEventKind::TenantReactivated(_) => self.status = TenantStatus::Active,
            TenantEventKind::TenantDeleted(_) => self.status = TenantStatus::Deleted,
        }
        self.updated_at = Some(at);
    }

    fn decode(stored: &StoredEvent) -> Result<Option<TenantEvent>, DomainError> {
        match stored.event_type.as_str() {
            TENANT_CREATED | TENANT_RENAMED | TENANT_PLAN_CHANGED | TENANT_SUSPENDED
            | TENANT_REACTIVATED | TENANT_DELETED => {}
            _ => return Ok(None),
        }
        let kind: TenantEventKind = decode_payload(stored)?;
        Ok(Some(TenantEvent {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id.clone(),
                sequence_number: stored.sequence_number,
                schema_version: stored.schema_version,
                occurred_at: stored.occurred_at,
            },
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tessera_core::aggregate::rehydrate;
    use tessera_core::context::ExecutionContext;
    use tessera_core::repository::to_stored_event;
    use tessera_test_support::{FixedClock, ManualClock};

    use super::*;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn stored(tenant: &Tenant) -> Vec<StoredEvent> {
        tenant
            .uncommitted_events()
            .iter()
            .map(|e| to_stored_event(&ExecutionContext::system(), e))
            .collect()
    }

    #[test]
    fn test_create_raises_created_event_with_trimmed_name() {
        let tenant = Tenant::create("t-1", "  Acme  ", TenantPlan::Standard, &clock()).unwrap();

        let events = tenant.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            TenantEventKind::TenantCreated(TenantCreated {
                tenant_id: "t-1".to_owned(),
                name: "Acme".to_owned(),
                plan: TenantPlan::Standard,
            })
        );
        assert_eq!(events[0].metadata.sequence_number, 1);
        assert_eq!(tenant.version(), 1);
        assert_eq!(tenant.committed_version(), 0);
    }

    #[test]
    fn test_create_rejects_blank_and_overlong_names() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);

        assert!(matches!(
            Tenant::create("t-1", "   ", TenantPlan::Free, &clock()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Tenant::create("t-1", &long, TenantPlan::Free, &clock()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_setters_to_current_value_raise_nothing() {
        // Arrange
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock()).unwrap();
        tenant.pull_uncommitted_events();

        // Act
        tenant.rename(" Acme ", &clock()).unwrap();
        tenant.change_plan(TenantPlan::Free, &clock()).unwrap();
        tenant.reactivate(&clock()).unwrap();

        // Assert
        assert!(tenant.uncommitted_events().is_empty());
        assert_eq!(tenant.version(), 1);
    }

    #[test]
    fn test_suspend_then_reactivate_toggles_status() {
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock()).unwrap();

        tenant.suspend(Some("unpaid".into()), &clock()).unwrap();
        tenant.suspend(None, &clock()).unwrap();
        let suspended = tenant.status();
        tenant.reactivate(&clock()).unwrap();

        assert_eq!(suspended, TenantStatus::Suspended);
        assert_eq!(tenant.status(), TenantStatus::Active);
        assert_eq!(tenant.version(), 3);
    }

    #[test]
    fn test_deleted_tenant_rejects_changes_and_ignores_second_delete() {
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock()).unwrap();
        tenant.delete(&clock());
        tenant.delete(&clock());

        let renamed = tenant.rename("Other", &clock());

        assert!(matches!(renamed, Err(DomainError::Validation(_))));
        assert_eq!(tenant.status(), TenantStatus::Deleted);
        assert_eq!(tenant.version(), 2);
    }

    #[test]
    fn test_rehydrate_replays_state_and_timestamps() {
        // Arrange
        let created_at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = ManualClock::new(created_at);
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock).unwrap();
        clock.advance(chrono::Duration::hours(1));
        tenant.rename("Acme Corp", &clock).unwrap();
        tenant.change_plan(TenantPlan::Enterprise, &clock).unwrap();
        let events = stored(&tenant);

        // Act
        let replayed: Tenant = rehydrate("t-1", &events).unwrap();

        // Assert
        assert_eq!(replayed.name(), "Acme Corp");
        assert_eq!(replayed.plan(), TenantPlan::Enterprise);
        assert_eq!(replayed.version(), 3);
        assert_eq!(replayed.committed_version(), 3);
        assert_eq!(replayed.created_at(), Some(created_at));
        assert_eq!(
            replayed.updated_at(),
            Some(created_at + chrono::Duration::hours(1))
        );
        assert!(replayed.uncommitted_events().is_empty());
    }

    #[test]
    fn test_unknown_event_types_are_skipped_but_counted() {
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock()).unwrap();
        tenant.rename("Acme Corp", &clock()).unwrap();
        let mut events = stored(&tenant);
        events[1].event_type = "tenant.logo_uploaded".to_owned();

        let replayed: Tenant = rehydrate("t-1", &events).unwrap();

        assert_eq!(replayed.name(), "Acme");
        assert_eq!(replayed.version(), 2);
    }

    #[test]
    fn test_stream_without_creation_event_is_corrupt() {
        let mut tenant = Tenant::create("t-1", "Acme", TenantPlan::Free, &clock()).unwrap();
        tenant.rename("Acme Corp", &clock()).unwrap();
        let mut events = stored(&tenant);
        events.remove(0);
        events[0].sequence_number = 1;

        let result = rehydrate::<Tenant>("t-1", &events);

        assert!(matches!(
            result,
            Err(DomainError::AggregateStreamCorrupt { .. })
        ));
    }
}
