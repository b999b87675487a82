use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use mo_core::error::OrchestratorError;

use crate::identity::IdentityError;

/// Error body returned by every route: `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<Value>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<Value>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

/// HTTP status for each orchestrator failure.
pub fn status_for(error: &OrchestratorError) -> StatusCode {
    match error {
        OrchestratorError::InvalidName(_) | OrchestratorError::MissingField(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::AlreadyExists(_) => StatusCode::CONFLICT,
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::NotRunning(_) | OrchestratorError::PortUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OrchestratorError::UpstreamUnreachable { .. } | OrchestratorError::Engine { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!(error = %error, "request failed");
        }
        Self::new(status, error.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::Unreachable(detail) => {
                tracing::warn!(%detail, "identity provider unreachable");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    format!("error contacting identity provider: {detail}"),
                )
            }
            IdentityError::Rejected { status, body } => Self::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
