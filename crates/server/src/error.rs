use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use carwash_core::MixerError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body is malformed or lacks required fields (400).
    #[error("{0}")]
    BadRequest(String),

    /// Failure reported by the core operations; status depends on the kind.
    #[error(transparent)]
    Mixer(#[from] MixerError),

    /// Anything else that went wrong while serving the request (500).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Mixer(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Mixer(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "INVALID_PARAMETER",
            ApiError::Mixer(err) => err.code(),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(%message, "request failed");
        } else {
            warn!(%message, "rejected request");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
