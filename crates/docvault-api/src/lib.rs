//! DocVault HTTP Service
//!
//! Tenant-scoped REST API over the isolation core.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  auth gateway ──▶ x-tenant-id / x-user-id                        │
//! │                         │                                        │
//! │  ┌──────────────────────▼──────────────────────┐                 │
//! │  │  axum Router  (request id, TraceLayer)      │                 │
//! │  │  health │ tenant │ users │ documents │ audit │                 │
//! │  └──────────────────────┬──────────────────────┘                 │
//! │                         │ one transaction per request            │
//! │  ┌──────────────────────▼──────────────────────┐                 │
//! │  │  repositories + similarity search + ledger  │                 │
//! │  └──────────────────────┬──────────────────────┘                 │
//! │                         ▼                                        │
//! │             PgPool ──▶ Postgres (RLS, pgvector)                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

use axum::Router;
use docvault_store::{connect, ensure_row_security_enforced, migrate};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{ConfigError, Settings};
pub use error::{ApiError, ApiResult};
pub use middleware::trace::REQUEST_ID_HEADER;

/// Shared service state
pub struct AppState {
    pub pool: PgPool,
    pub settings: Settings,
}

impl AppState {
    /// Connect, migrate if configured, and refuse a role that would bypass
    /// row security
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let pool = connect(&settings.database_url, &settings.pool).await?;
        if settings.migrate_on_start {
            let applied = migrate::run(&pool).await?;
            info!(applied = applied.len(), "schema migrated");
        }
        ensure_row_security_enforced(&pool).await?;
        Ok(Self::new(pool, settings))
    }

    pub fn new(pool: PgPool, settings: Settings) -> Self {
        Self { pool, settings }
    }
}

/// Build the API router
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new().nest("/api/v1", routes::api_routes());
    if !state.settings.is_production() {
        router = router.layer(axum::middleware::from_fn(error::expose_error_detail));
    }
    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(middleware::trace::RequestSpan))
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER)),
        )
        .with_state(state)
}
