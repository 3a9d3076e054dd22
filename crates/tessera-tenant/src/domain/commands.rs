//! Commands for the tenant context.

use serde::Deserialize;
use tessera_cqrs::{Command, FieldViolation, Message};

use crate::domain::aggregates::{MAX_NAME_LENGTH, TenantView};
use crate::domain::events::TenantPlan;

fn check_name(name: &str, violations: &mut Vec<FieldViolation>) {
    let name = name.trim();
    if name.is_empty() {
        violations.push(FieldViolation::new("name", "must not be blank"));
    } else if name.chars().count() > MAX_NAME_LENGTH {
        violations.push(FieldViolation::new(
            "name",
            format!("must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
}

fn check_plan(plan: &str, violations: &mut Vec<FieldViolation>) {
    if plan.parse::<TenantPlan>().is_err() {
        violations.push(FieldViolation::new(
            "plan",
            "must be one of free, standard, enterprise",
        ));
    }
}

pub(crate) fn check_tenant_id(tenant_id: &str, violations: &mut Vec<FieldViolation>) {
    if tenant_id.trim().is_empty() {
        violations.push(FieldViolation::new("tenant_id", "must not be blank"));
    }
}

/// Command to create a new tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    /// Display name.
    pub name: String,
    /// Plan slug; `free` when absent.
    #[serde(default = "default_plan")]
    pub plan: String,
}

fn default_plan() -> String {
    TenantPlan::Free.as_str().to_owned()
}

impl Message for CreateTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_name(&self.name, &mut violations);
        check_plan(&self.plan, &mut violations);
        violations
    }
}

impl Command for CreateTenant {
    const TYPE: &'static str = "CreateTenant";
    type Output = TenantView;
}

/// Command to rename a tenant.
#[derive(Debug, Clone)]
pub struct RenameTenant {
    pub tenant_id: String,
    pub name: String,
}

impl Message for RenameTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        check_name(&self.name, &mut violations);
        violations
    }
}

impl Command for RenameTenant {
    const TYPE: &'static str = "RenameTenant";
    type Output = TenantView;
}

/// Command to move a tenant to another plan.
#[derive(Debug, Clone)]
pub struct ChangeTenantPlan {
    pub tenant_id: String,
    pub plan: String,
}

impl Message for ChangeTenantPlan {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        check_plan(&self.plan, &mut violations);
        violations
    }
}

impl Command for ChangeTenantPlan {
    const TYPE: &'static str = "ChangeTenantPlan";
    type Output = TenantView;
}

/// Command to suspend a tenant.
#[derive(Debug, Clone)]
pub struct SuspendTenant {
    pub tenant_id: String,
    pub reason: Option<String>,
}

impl Message for SuspendTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        violations
    }
}

impl Command for SuspendTenant {
    const TYPE: &'static str = "SuspendTenant";
    type Output = TenantView;
}

/// Command to reactivate a suspended tenant.
#[derive(Debug, Clone)]
pub struct ReactivateTenant {
    pub tenant_id: String,
}

impl Message for ReactivateTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        violations
    }
}

impl Command for ReactivateTenant {
    const TYPE: &'static str = "ReactivateTenant";
    type Output = TenantView;
}

/// Command to soft delete a tenant.
#[derive(Debug, Clone)]
pub struct DeleteTenant {
    pub tenant_id: String,
}

impl Message for DeleteTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        violations
    }
}

impl Command for DeleteTenant {
    const TYPE: &'static str = "DeleteTenant";
    type Output = TenantView;
}
