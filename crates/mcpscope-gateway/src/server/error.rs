//! Mapping of manager errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mcpscope_core::ManagerError;
use serde_json::json;
use tracing::debug;

/// Error body: `{"error": kind, "message": text}`
#[derive(Debug)]
pub struct ApiError(pub ManagerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ManagerError::Validation(_) => StatusCode::BAD_REQUEST,
            ManagerError::NotRegistered(_) => StatusCode::NOT_FOUND,
            ManagerError::Conflict(_) => StatusCode::CONFLICT,
            ManagerError::NotConnected { .. } => StatusCode::CONFLICT,
            ManagerError::ToolNotFound { .. } => StatusCode::NOT_FOUND,
            ManagerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ManagerError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(error: ManagerError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(status = %status, error = %self.0, "[Gateway] Request failed");
        let body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
