//! Tenant directory: a read model built from the context's own integration
//! events, consumed through the inbox.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::context::ExecutionContext;
use tessera_core::envelope::IntegrationEventEnvelope;
use tessera_core::error::DomainError;
use tessera_messaging::{InProcessEventBus, InboxConsumer, InboxHandler, Subscription};
use tracing::{debug, warn};

use crate::application::integration::{
    INTEGRATION_EVENT_TYPES, TENANT_CREATED, TENANT_DELETED, TENANT_PLAN_CHANGED,
    TENANT_REACTIVATED, TENANT_RENAMED, TENANT_SUSPENDED,
};
use crate::domain::aggregates::TenantStatus;
use crate::domain::events::TenantPlan;

/// One row of the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub id: String,
    pub name: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    /// Stream version of the last event folded into this row.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    tenant_id: String,
    version: i64,
    name: Option<String>,
    plan: Option<TenantPlan>,
}

#[derive(Debug)]
enum Change {
    Created { name: String, plan: TenantPlan },
    Update(Update),
    Deleted,
}

#[derive(Debug)]
enum Update {
    Renamed(String),
    PlanChanged(TenantPlan),
    Suspended,
    Reactivated,
}

#[derive(Debug)]
struct Staged {
    at: DateTime<Utc>,
    change: Change,
}

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<String, TenantSummary>,
    /// Changes that arrived ahead of their predecessors, by stream version.
    early: BTreeMap<String, BTreeMap<i64, Staged>>,
    deleted: BTreeSet<String>,
}

impl State {
    fn applied_version(&self, id: &str) -> i64 {
        self.rows.get(id).map_or(0, |row| row.version)
    }

    /// Folds every staged change that directly follows the row's version.
    fn drain(&mut self, id: &str) {
        loop {
            let next = self.applied_version(id) + 1;
            let Some(queue) = self.early.get_mut(id) else {
                return;
            };
            let Some(staged) = queue.remove(&next) else {
                return;
            };
            if queue.is_empty() {
                self.early.remove(id);
            }
            if !self.fold(id, next, staged) {
                return;
            }
        }
    }

    /// Applies one change at `version`. Returns `false` when nothing after
    /// it can be applied yet.
    fn fold(&mut self, id: &str, version: i64, staged: Staged) -> bool {
        let update = match staged.change {
            Change::Created { name, plan } => {
                let row = TenantSummary {
                    id: id.to_owned(),
                    name,
                    plan,
                    status: TenantStatus::Active,
                    version,
                    updated_at: staged.at,
                };
                self.rows.insert(id.to_owned(), row);
                return true;
            }
            Change::Deleted => {
                self.rows.remove(id);
                self.early.remove(id);
                self.deleted.insert(id.to_owned());
                return false;
            }
            Change::Update(update) => update,
        };
        let Some(row) = self.rows.get_mut(id) else {
            warn!(tenant_id = id, version, "stream does not open with creation, dropping change");
            return false;
        };
        match update {
            Update::Renamed(name) => row.name = name,
            Update::PlanChanged(plan) => row.plan = plan,
            Update::Suspended => row.status = TenantStatus::Suspended,
            Update::Reactivated => row.status = TenantStatus::Active,
        }
        row.version = version;
        row.updated_at = staged.at;
        true
    }
}

/// In-memory directory of live tenants, keyed by id.
///
/// Changes are folded in stream-version order per tenant, whatever order
/// they are delivered in. A change that arrives early is held until its
/// predecessors have been applied; one at or below the row's version is
/// ignored. Deleted tenants are dropped from the directory and ignore any
/// later change.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    state: Arc<RwLock<State>>,
}

impl TenantDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tenant, optionally filtered by status, ordered by name then id.
    #[must_use]
    pub fn list(&self, status: Option<TenantStatus>) -> Vec<TenantSummary> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<TenantSummary> = state
            .rows
            .values()
            .filter(|row| status.is_none_or(|s| row.status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<TenantSummary> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .get(id)
            .cloned()
    }

    /// Number of changes held back waiting for an earlier one.
    #[must_use]
    pub fn held_back(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .early
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    fn accept(&self, id: &str, version: i64, staged: Staged) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.deleted.contains(id) || version <= state.applied_version(id) {
            debug!(tenant_id = id, version, "change already reflected");
            return;
        }
        state
            .early
            .entry(id.to_owned())
            .or_default()
            .insert(version, staged);
        state.drain(id);
    }

    /// Subscribes `consumer` to every tenant integration event on `bus`.
    pub fn subscribe(
        bus: &InProcessEventBus,
        consumer: Arc<InboxConsumer<Self>>,
    ) -> Vec<Subscription> {
        INTEGRATION_EVENT_TYPES
            .iter()
            .map(|event_type| bus.subscribe(*event_type, consumer.clone()))
            .collect()
    }
}

#[async_trait]
impl InboxHandler for TenantDirectory {
    fn name(&self) -> &'static str {
        "tenant-directory"
    }

    /// Folds one change into the directory.
    ///
    /// The rows live outside the consumer's transaction. Applying a version
    /// the directory already holds is a no-op, so a message redelivered
    /// after a failed commit leaves the rows unchanged.
    async fn apply(
        &self,
        _ctx: &ExecutionContext,
        envelope: &IntegrationEventEnvelope,
    ) -> Result<(), DomainError> {
        let payload: Payload = serde_json::from_value(envelope.payload.clone()).map_err(|e| {
            DomainError::Validation(format!("malformed {} payload: {e}", envelope.event_type))
        })?;

        let change = match envelope.event_type.as_str() {
            TENANT_CREATED => Change::Created {
                name: payload.name.unwrap_or_default(),
                plan: payload.plan.unwrap_or(TenantPlan::Free),
            },
            TENANT_RENAMED => Change::Update(Update::Renamed(payload.name.unwrap_or_default())),
            TENANT_PLAN_CHANGED => {
                Change::Update(Update::PlanChanged(payload.plan.unwrap_or(TenantPlan::Free)))
            }
            TENANT_SUSPENDED => Change::Update(Update::Suspended),
            TENANT_REACTIVATED => Change::Update(Update::Reactivated),
            TENANT_DELETED => Change::Deleted,
            other => {
                debug!(event_type = other, "ignoring event");
                return Ok(());
            }
        };
        let staged = Staged {
            at: envelope.occurred_at,
            change,
        };
        self.accept(&payload.tenant_id, payload.version, staged);
        Ok(())
    }
}
