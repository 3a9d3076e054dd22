//! Routes for the tenant context.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};

use tessera_tenant::application::directory::TenantSummary;
use tessera_tenant::application::query_handlers::{GetTenant, ListTenants};
use tessera_tenant::domain::aggregates::{TenantStatus, TenantView};
use tessera_tenant::domain::commands::{
    ChangeTenantPlan, CreateTenant, DeleteTenant, ReactivateTenant, RenameTenant, SuspendTenant,
};

use crate::error::ApiError;
use crate::identity::RequestIdentity;
use crate::state::AppState;

/// Request body for POST /{id}/rename.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Request body for POST /{id}/plan.
#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
}

/// Request body for POST /{id}/suspend.
#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query string for GET /.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<TenantStatus>,
}

/// POST /
#[instrument(skip_all, fields(request_id = identity.0.request_id.as_deref()))]
async fn create_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Json(command): Json<CreateTenant>,
) -> Result<(StatusCode, Json<TenantView>), ApiError> {
    let view = state.commands.execute(&identity.context(), command).await?;
    info!(tenant_id = %view.id, "tenant created");
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /{id}/rename
#[instrument(skip(state, identity, request), fields(request_id = identity.0.request_id.as_deref()))]
async fn rename_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<TenantView>, ApiError> {
    let command = RenameTenant {
        tenant_id,
        name: request.name,
    };
    Ok(Json(state.commands.execute(&identity.context(), command).await?))
}

/// POST /{id}/plan
#[instrument(skip(state, identity, request), fields(request_id = identity.0.request_id.as_deref()))]
async fn change_plan(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<Json<TenantView>, ApiError> {
    let command = ChangeTenantPlan {
        tenant_id,
        plan: request.plan,
    };
    Ok(Json(state.commands.execute(&identity.context(), command).await?))
}

/// POST /{id}/suspend
#[instrument(skip(state, identity, request), fields(request_id = identity.0.request_id.as_deref()))]
async fn suspend_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
    Json(request): Json<SuspendRequest>,
) -> Result<Json<TenantView>, ApiError> {
    let command = SuspendTenant {
        tenant_id,
        reason: request.reason,
    };
    Ok(Json(state.commands.execute(&identity.context(), command).await?))
}

/// POST /{id}/reactivate
#[instrument(skip(state, identity), fields(request_id = identity.0.request_id.as_deref()))]
async fn reactivate_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantView>, ApiError> {
    let command = ReactivateTenant { tenant_id };
    Ok(Json(state.commands.execute(&identity.context(), command).await?))
}

/// DELETE /{id}
#[instrument(skip(state, identity), fields(request_id = identity.0.request_id.as_deref()))]
async fn delete_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantView>, ApiError> {
    let command = DeleteTenant { tenant_id };
    Ok(Json(state.commands.execute(&identity.context(), command).await?))
}

/// GET /{id}
#[instrument(skip(state, identity), fields(request_id = identity.0.request_id.as_deref()))]
async fn get_tenant(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantView>, ApiError> {
    let query = GetTenant { tenant_id };
    Ok(Json(state.queries.execute(&identity.context(), query).await?))
}

/// GET /
///
/// Reads the directory, which lags behind commands until the outbox
/// publisher has delivered their events.
#[instrument(skip(state, identity), fields(request_id = identity.0.request_id.as_deref()))]
async fn list_tenants(
    State(state): State<AppState>,
    identity: RequestIdentity,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TenantSummary>>, ApiError> {
    let query = ListTenants {
        status: params.status,
    };
    Ok(Json(state.queries.execute(&identity.context(), query).await?))
}

/// Returns the router for the tenant context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_tenant).get(list_tenants))
        .route("/{id}", get(get_tenant).delete(delete_tenant))
        .route("/{id}/rename", post(rename_tenant))
        .route("/{id}/plan", post(change_plan))
        .route("/{id}/suspend", post(suspend_tenant))
        .route("/{id}/reactivate", post(reactivate_tenant))
}
