//! Tenant provisioning and the caller's own tenant record

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use docvault_tenant::{NewTenant, Tenant, TenantContext, TenantRepository, Transition, UnitOfWork};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{audit, begin, Payload};
use crate::error::ApiResult;
use crate::middleware::context::{Caller, ClientInfo};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(current).delete(soft_delete))
        .route("/restore", post(restore))
}

/// Create a tenant. System route: the new tenant's id is generated here and
/// bound for the insert, so no tenant header is involved.
pub async fn provision(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Payload(new): Payload<NewTenant>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let mut uow = UnitOfWork::begin(&state.pool, TenantContext::new(Uuid::new_v4())).await?;
    let tenant = TenantRepository::new(&mut uow).create(new).await?;
    audit(
        &mut uow,
        &client,
        "tenant.created",
        "tenant",
        tenant.id,
        json!({"name": tenant.name}),
    )
    .await?;
    uow.commit().await?;
    info!(tenant_id = %tenant.id, "tenant provisioned");
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn current(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<Tenant>> {
    let mut uow = begin(&state, caller).await?;
    Ok(Json(TenantRepository::new(&mut uow).current().await?))
}

pub async fn soft_delete(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
) -> ApiResult<Json<Transition<Tenant>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = TenantRepository::new(&mut uow).soft_delete().await?;
    if transition.changed {
        let id = transition.entity.id;
        audit(&mut uow, &client, "tenant.deleted", "tenant", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}

pub async fn restore(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    client: ClientInfo,
) -> ApiResult<Json<Transition<Tenant>>> {
    let mut uow = begin(&state, caller).await?;
    let transition = TenantRepository::new(&mut uow).restore().await?;
    if transition.changed {
        let id = transition.entity.id;
        audit(&mut uow, &client, "tenant.restored", "tenant", id, json!({})).await?;
    }
    uow.commit().await?;
    Ok(Json(transition))
}
