//! Command handlers for the tenant context.
//!
//! Each handler loads the tenant, applies the change, and persists the
//! resulting events together with their integration envelopes in one
//! transaction: either both reach storage or neither does.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::aggregate::AggregateRoot;
use tessera_core::clock::{Clock, SharedClock};
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::event_store::{EventStore, StreamKey};
use tessera_core::outbox::Outbox;
use tessera_core::repository::EventSourcedRepository;
use tessera_core::transaction::{TransactionManager, run_in_transaction};
use tessera_cqrs::{CommandBus, CommandHandler, DispatchError};
use tracing::info;
use uuid::Uuid;

use crate::application::integration::to_envelope;
use crate::domain::aggregates::{Tenant, TenantView};
use crate::domain::commands::{
    ChangeTenantPlan, CreateTenant, DeleteTenant, ReactivateTenant, RenameTenant, SuspendTenant,
};
use crate::domain::events::TenantPlan;

/// Stream key of tenant `id`. Tenants are not owned by another tenant.
#[must_use]
pub fn tenant_stream(id: &str) -> StreamKey {
    EventSourcedRepository::<Tenant>::stream_key(None, id)
}

/// Handles every tenant command.
#[derive(Clone)]
pub struct TenantCommandHandler {
    repository: EventSourcedRepository<Tenant>,
    outbox: Arc<dyn Outbox>,
    transactions: Arc<dyn TransactionManager>,
    clock: SharedClock,
}

impl fmt::Debug for TenantCommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCommandHandler").finish_non_exhaustive()
    }
}

impl TenantCommandHandler {
    #[must_use]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        outbox: Arc<dyn Outbox>,
        transactions: Arc<dyn TransactionManager>,
        clock: SharedClock,
    ) -> Self {
        Self {
            repository: EventSourcedRepository::new(event_store),
            outbox,
            transactions,
            clock,
        }
    }

    /// Registers this handler for every tenant command.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::DuplicateRegistration` when a tenant command
    /// already has a handler on `bus`.
    pub fn register(self, bus: &mut CommandBus) -> Result<(), DispatchError> {
        bus.register::<CreateTenant, _>(self.clone())?;
        bus.register::<RenameTenant, _>(self.clone())?;
        bus.register::<ChangeTenantPlan, _>(self.clone())?;
        bus.register::<SuspendTenant, _>(self.clone())?;
        bus.register::<ReactivateTenant, _>(self.clone())?;
        bus.register::<DeleteTenant, _>(self)?;
        Ok(())
    }

    /// Appends the tenant's uncommitted events and their envelopes. Must run
    /// inside the caller's transaction.
    async fn persist(
        &self,
        ctx: &ExecutionContext,
        mut tenant: Tenant,
    ) -> Result<TenantView, DomainError> {
        let events = tenant.uncommitted_events();
        self.repository
            .save(ctx, &tenant_stream(tenant.id()), &mut tenant)
            .await?;
        for event in &events {
            self.outbox.append(ctx, to_envelope(ctx, event)).await?;
        }
        Ok(tenant.view())
    }

    /// Loads tenant `id`, applies `change` and persists the result, all in
    /// one transaction.
    async fn modify<F>(
        &self,
        ctx: &ExecutionContext,
        id: &str,
        change: F,
    ) -> Result<TenantView, DispatchError>
    where
        F: FnOnce(&mut Tenant, &dyn Clock) -> Result<(), DomainError> + Send,
    {
        let stream = tenant_stream(id);
        run_in_transaction(ctx, self.transactions.as_ref(), |tx| async move {
            let mut tenant = self.repository.get(&tx, &stream).await?;
            change(&mut tenant, self.clock.as_ref())?;
            Ok(self.persist(&tx, tenant).await?)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<CreateTenant> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: CreateTenant,
    ) -> Result<TenantView, DispatchError> {
        let plan: TenantPlan = command.plan.parse()?;
        let id = Uuid::now_v7().to_string();
        let tenant = Tenant::create(&id, &command.name, plan, self.clock.as_ref())?;
        let view = run_in_transaction(ctx, self.transactions.as_ref(), |tx| async move {
            self.persist(&tx, tenant).await
        })
        .await?;
        info!(tenant_id = %view.id, plan = %view.plan, "tenant created");
        Ok(view)
    }
}

#[async_trait]
impl CommandHandler<RenameTenant> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: RenameTenant,
    ) -> Result<TenantView, DispatchError> {
        let view = self
            .modify(ctx, &command.tenant_id, |tenant, clock| {
                tenant.rename(&command.name, clock)
            })
            .await?;
        info!(tenant_id = %view.id, version = view.version, "tenant renamed");
        Ok(view)
    }
}

#[async_trait]
impl CommandHandler<ChangeTenantPlan> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: ChangeTenantPlan,
    ) -> Result<TenantView, DispatchError> {
        let plan: TenantPlan = command.plan.parse()?;
        let view = self
            .modify(ctx, &command.tenant_id, |tenant, clock| {
                tenant.change_plan(plan, clock)
            })
            .await?;
        info!(tenant_id = %view.id, plan = %view.plan, "tenant plan changed");
        Ok(view)
    }
}

#[async_trait]
impl CommandHandler<SuspendTenant> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: SuspendTenant,
    ) -> Result<TenantView, DispatchError> {
        let view = self
            .modify(ctx, &command.tenant_id, |tenant, clock| {
                tenant.suspend(command.reason, clock)
            })
            .await?;
        info!(tenant_id = %view.id, "tenant suspended");
        Ok(view)
    }
}

#[async_trait]
impl CommandHandler<ReactivateTenant> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: ReactivateTenant,
    ) -> Result<TenantView, DispatchError> {
        let view = self
            .modify(ctx, &command.tenant_id, Tenant::reactivate)
            .await?;
        info!(tenant_id = %view.id, "tenant reactivated");
        Ok(view)
    }
}

#[async_trait]
impl CommandHandler<DeleteTenant> for TenantCommandHandler {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        command: DeleteTenant,
    ) -> Result<TenantView, DispatchError> {
        let view = self
            .modify(ctx, &command.tenant_id, |tenant, clock| {
                tenant.delete(clock);
                Ok(())
            })
            .await?;
        info!(tenant_id = %view.id, "tenant deleted");
        Ok(view)
    }
}
