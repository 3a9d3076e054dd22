//! Domain events for the tenant context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_core::error::DomainError;
use tessera_core::event::{DomainEvent, EventMetadata};

/// Event type of [`TenantEventKind::TenantCreated`].
pub const TENANT_CREATED: &str = "tenant.created";
/// Event type of [`TenantEventKind::TenantRenamed`].
pub const TENANT_RENAMED: &str = "tenant.renamed";
/// Event type of [`TenantEventKind::TenantPlanChanged`].
pub const TENANT_PLAN_CHANGED: &str = "tenant.plan_changed";
/// Event type of [`TenantEventKind::TenantSuspended`].
pub const TENANT_SUSPENDED: &str = "tenant.suspended";
/// Event type of [`TenantEventKind::TenantReactivated`].
pub const TENANT_REACTIVATED: &str = "tenant.reactivated";
/// Event type of [`TenantEventKind::TenantDeleted`].
pub const TENANT_DELETED: &str = "tenant.deleted";

/// Subscription plan of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantPlan {
    Free,
    Standard,
    Enterprise,
}

impl TenantPlan {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for TenantPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantPlan {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(DomainError::Validation(format!("unknown plan: {other}"))),
        }
    }
}

/// Emitted when a tenant is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantCreated {
    /// The tenant identifier.
    pub tenant_id: String,
    /// Display name.
    pub name: String,
    /// Initial plan.
    pub plan: TenantPlan,
}

/// Emitted when a tenant's name changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRenamed {
    pub tenant_id: String,
    pub name: String,
}

/// Emitted when a tenant moves to another plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantPlanChanged {
    pub tenant_id: String,
    pub plan: TenantPlan,
}

/// Emitted when a tenant is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSuspended {
    pub tenant_id: String,
    /// Free-text reason, if one was given.
    pub reason: Option<String>,
}

/// Emitted when a suspended tenant is reactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantReactivated {
    pub tenant_id: String,
}

/// Emitted when a tenant is soft deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDeleted {
    pub tenant_id: String,
}

/// Event payload variants for the tenant context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TenantEventKind {
    TenantCreated(TenantCreated),
    TenantRenamed(TenantRenamed),
    TenantPlanChanged(TenantPlanChanged),
    TenantSuspended(TenantSuspended),
    TenantReactivated(TenantReactivated),
    TenantDeleted(TenantDeleted),
}

impl TenantEventKind {
    /// Stored event type of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TenantCreated(_) => TENANT_CREATED,
            Self::TenantRenamed(_) => TENANT_RENAMED,
            Self::TenantPlanChanged(_) => TENANT_PLAN_CHANGED,
            Self::TenantSuspended(_) => TENANT_SUSPENDED,
            Self::TenantReactivated(_) => TENANT_REACTIVATED,
            Self::TenantDeleted(_) => TENANT_DELETED,
        }
    }
}

/// Domain event envelope for the tenant context.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TenantEventKind,
}

impl DomainEvent for TenantEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(&self.kind).unwrap_or(serde_json::Value::Null)
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
