//! HTTP error registry
//!
//! Every failure leaves the service as `{"error": {"code", "message"}}` with
//! a stable code from the table below. Internal and unavailable errors also
//! carry a `detail` outside production; see [`expose_error_detail`].

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docvault_tenant::DataError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("tenant context is missing or malformed")]
    MissingTenantContext,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Restricted(String),

    #[error("access denied")]
    Isolation,

    #[error("{0}")]
    Immutable(String),

    #[error("service temporarily unavailable")]
    Unavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingTenantContext => "AUTH_005",
            Self::Validation(_) => "VAL_001",
            Self::NotFound(_) => "RES_001",
            Self::Conflict(_) => "CON_001",
            Self::Restricted(_) => "CON_002",
            Self::Isolation => "SEC_001",
            Self::Immutable(_) => "SEC_002",
            Self::Unavailable(_) => "SYS_001",
            Self::Internal(_) => "SYS_003",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingTenantContext | Self::Isolation => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::Restricted(_) => StatusCode::CONFLICT,
            Self::Immutable(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound { .. } => Self::NotFound(err.to_string()),
            DataError::IsolationViolation { .. } => Self::Isolation,
            DataError::ImmutabilityViolation { message, .. } => Self::Immutable(message),
            DataError::Conflict { .. } => Self::Conflict(err.to_string()),
            DataError::ReferentialRestriction { .. } => Self::Restricted(err.to_string()),
            DataError::Invalid(message) => Self::Validation(message),
            DataError::Unavailable(detail) => Self::Unavailable(detail),
            DataError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Full error body, kept on the response for [`expose_error_detail`]
#[derive(Debug, Clone)]
struct DetailedError(ErrorBody);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::Internal(detail) => {
                error!(code = self.code(), %detail, "request failed");
                Some(detail.clone())
            }
            Self::Unavailable(detail) => {
                warn!(code = self.code(), %detail, "request failed");
                Some(detail.clone())
            }
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                detail: None,
            },
        };
        let mut response = (status, Json(body.clone())).into_response();
        if let Some(detail) = detail {
            let mut full = body;
            full.error.detail = Some(detail);
            response.extensions_mut().insert(DetailedError(full));
        }
        response
    }
}

/// Put the internal detail of a failure back into the body. Only layered
/// outside production.
pub async fn expose_error_detail(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    match response.extensions().get::<DetailedError>().cloned() {
        Some(DetailedError(full)) => (response.status(), Json(full)).into_response(),
        None => response,
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
