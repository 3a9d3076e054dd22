//! Queries and query handlers for the tenant context.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::context::ExecutionContext;
use tessera_core::event_store::EventStore;
use tessera_core::repository::EventSourcedRepository;
use tessera_cqrs::{DispatchError, FieldViolation, Message, Query, QueryBus, QueryHandler};

use crate::application::command_handlers::tenant_stream;
use crate::application::directory::{TenantDirectory, TenantSummary};
use crate::domain::aggregates::{Tenant, TenantStatus, TenantView};
use crate::domain::commands::check_tenant_id;

/// Query for one tenant, read from its event stream.
#[derive(Debug, Clone)]
pub struct GetTenant {
    pub tenant_id: String,
}

impl Message for GetTenant {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_tenant_id(&self.tenant_id, &mut violations);
        violations
    }
}

impl Query for GetTenant {
    const TYPE: &'static str = "GetTenant";
    type Output = TenantView;
}

/// Query over the tenant directory.
#[derive(Debug, Clone, Default)]
pub struct ListTenants {
    /// Only tenants in this state; every live tenant when `None`.
    pub status: Option<TenantStatus>,
}

impl Message for ListTenants {
    fn message_type(&self) -> &'static str {
        Self::TYPE
    }
}

impl Query for ListTenants {
    const TYPE: &'static str = "ListTenants";
    type Output = Vec<TenantSummary>;
}

/// Answers `GetTenant` by replaying the tenant's stream.
#[derive(Clone)]
pub struct GetTenantHandler {
    repository: EventSourcedRepository<Tenant>,
}

impl GetTenantHandler {
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self {
            repository: EventSourcedRepository::new(event_store),
        }
    }
}

#[async_trait]
impl QueryHandler<GetTenant> for GetTenantHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        query: GetTenant,
    ) -> Result<TenantView, DispatchError> {
        let tenant = self
            .repository
            .get(ctx, &tenant_stream(&query.tenant_id))
            .await?;
        Ok(tenant.view())
    }
}

/// Answers `ListTenants` from the directory projection.
#[derive(Debug, Clone)]
pub struct ListTenantsHandler {
    directory: TenantDirectory,
}

impl ListTenantsHandler {
    #[must_use]
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl QueryHandler<ListTenants> for ListTenantsHandler {
    async fn handle(
        &self,
        _ctx: &ExecutionContext,
        query: ListTenants,
    ) -> Result<Vec<TenantSummary>, DispatchError> {
        Ok(self.directory.list(query.status))
    }
}

/// Registers both tenant query handlers.
///
/// # Errors
///
/// Returns `DispatchError::DuplicateRegistration` when a tenant query already
/// has a handler on `bus`.
pub fn register(
    bus: &mut QueryBus,
    event_store: Arc<dyn EventStore>,
    directory: TenantDirectory,
) -> Result<(), DispatchError> {
    bus.register::<GetTenant, _>(GetTenantHandler::new(event_store))?;
    bus.register::<ListTenants, _>(ListTenantsHandler::new(directory))?;
    Ok(())
}
