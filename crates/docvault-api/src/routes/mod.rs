//! API routes

pub mod audit;
pub mod documents;
pub mod health;
pub mod tenants;
pub mod users;

use axum::extract::{FromRequest, FromRequestParts};
use axum::routing::post;
use axum::Router;
use docvault_audit::{AuditLedger, AuditRecord};
use docvault_tenant::{DataError, UnitOfWork, UserRepository};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::context::{Caller, ClientInfo};
use crate::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health::router())
        .route("/tenants", post(tenants::provision))
        .nest("/tenant", tenants::router())
        .nest("/users", users::router())
        .nest("/documents", documents::router())
        .nest("/audit-logs", audit::router())
}

/// JSON body whose rejection is reported as `VAL_001`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Payload<T>(pub T);

/// Path parameters whose rejection is reported as `VAL_001`
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Query string whose rejection is reported as `VAL_001`
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Params<T>(pub T);

/// Start the request's unit of work. A forwarded user id must name a live
/// user of the caller's tenant.
///
/// Handlers that write call [`UnitOfWork::commit`] once the mutation and
/// its ledger entry are both in; any earlier return drops the unit of work
/// and discards both.
pub(crate) async fn begin(state: &AppState, caller: Caller) -> ApiResult<UnitOfWork> {
    let context = caller.0;
    let mut uow = UnitOfWork::begin(&state.pool, context).await?;
    if let Some(user_id) = context.user_id {
        UserRepository::new(&mut uow).get(user_id).await.map_err(|err| match err {
            DataError::NotFound { .. } => {
                warn!(
                    target: "docvault::security",
                    tenant_id = %context.tenant_id,
                    %user_id,
                    "forwarded user is not a live user of the tenant"
                );
                ApiError::MissingTenantContext
            }
            other => other.into(),
        })?;
    }
    Ok(uow)
}

/// Ledger entry for a mutation, written in the request's unit of work
pub(crate) async fn audit(
    uow: &mut UnitOfWork,
    client: &ClientInfo,
    action: &str,
    resource_type: &str,
    resource_id: Uuid,
    details: serde_json::Value,
) -> ApiResult<()> {
    AuditLedger::new(uow)
        .record(
            AuditRecord::new(action, resource_type, resource_id)
                .network_address(client.network_address.as_deref())
                .agent(client.agent.as_deref())
                .details(details),
        )
        .await?;
    Ok(())
}
