//! Caller identity and client information
//!
//! Authentication happens upstream; the gateway forwards the verified
//! identity as headers. Requests without a usable tenant header are refused
//! before any data access.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use docvault_audit::MAX_NETWORK_ADDRESS_LEN;
use docvault_tenant::TenantContext;
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const MAX_AGENT_LEN: usize = 512;

/// Verified tenant (and optional user) of the request
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub TenantContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(&parts.headers, TENANT_HEADER)
            .ok_or(ApiError::MissingTenantContext)??;
        let mut context = TenantContext::new(tenant_id);
        if let Some(user_id) = header_uuid(&parts.headers, USER_HEADER) {
            context = context.with_user(user_id?);
        }
        Ok(Self(context))
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Option<Result<Uuid, ApiError>> {
    let value = headers.get(name)?;
    Some(
        value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or(ApiError::MissingTenantContext),
    )
}

/// Network address and agent recorded with audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub network_address: Option<String>,
    pub agent: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        // First hop is the original client
        let network_address = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .map(|ip| ip.to_string())
            .filter(|ip| ip.len() <= MAX_NETWORK_ADDRESS_LEN);
        let agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(MAX_AGENT_LEN).collect());
        Self {
            network_address,
            agent,
        }
    }
}
