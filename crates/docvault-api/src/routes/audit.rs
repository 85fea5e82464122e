//! Read-only access to the caller's audit ledger

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use docvault_audit::{AuditFilter, AuditLedger, AuditLogEntry, ExportFormat};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{begin, Params};
use crate::error::ApiResult;
use crate::middleware::context::Caller;
use crate::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_entries))
        .route("/export", get(export_entries))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub actor: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub format: Option<ExportFormat>,
}

impl AuditParams {
    fn filter(&self, default_limit: Option<usize>) -> AuditFilter {
        AuditFilter {
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            actor: self.actor,
            since: self.since,
            until: self.until,
            limit: self.limit.or(default_limit).map(|l| l.min(MAX_LIMIT)),
        }
    }
}

/// Newest first
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Params(params): Params<AuditParams>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let mut uow = begin(&state, caller).await?;
    let entries = AuditLedger::new(&mut uow)
        .list(&params.filter(Some(DEFAULT_LIMIT)))
        .await?;
    Ok(Json(entries))
}

pub async fn export_entries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Params(params): Params<AuditParams>,
) -> ApiResult<Response> {
    let mut uow = begin(&state, caller).await?;
    let format = params.format.unwrap_or(ExportFormat::Json);
    let body = AuditLedger::new(&mut uow)
        .export(&params.filter(None), format)
        .await?;
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
