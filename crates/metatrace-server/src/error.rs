use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use metatrace_chain::ChainError;
use metatrace_shared::{PasswordError, SessionError};
use metatrace_store::StoreError;

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Session expired")]
    Expired,

    /// Pinning or analysis service failure; `detail` is the remote message.
    #[error("{message}: {detail}")]
    Upstream { message: String, detail: String },

    #[error("Blockchain transaction failed: {0}")]
    Chain(#[from] ChainError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn upstream(message: impl Into<String>, detail: impl ToString) -> Self {
        ApiError::Upstream {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::Expired => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } | ApiError::Chain(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Expired => serde_json::json!({ "message": SESSION_EXPIRED_MESSAGE }),
            ApiError::Upstream { message, detail } => serde_json::json!({
                "message": message,
                "error": detail,
            }),
            ApiError::Chain(e) => serde_json::json!({
                "message": "Blockchain transaction failed",
                "error": e.to_string(),
            }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                serde_json::json!({ "message": "Internal Server Error" })
            }
            other => serde_json::json!({ "message": other.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("Record not found".into()),
            StoreError::Conflict => ApiError::Conflict("Record already exists".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired => ApiError::Expired,
            SessionError::Invalid => ApiError::Forbidden("Invalid token".into()),
            SessionError::Encoding(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Background task failed: {e}"))
    }
}
