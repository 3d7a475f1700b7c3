use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{db::DbError, error::EngineError, observability::metrics};

/// JSON error body: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Error response for API requests.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn internal(code: &'static str, message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::record_api_error(self.code);
        let body = ErrorResponse::new(self.code, self.message);
        (self.status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => {
                Self::new(StatusCode::NOT_FOUND, "not_found", "Resource not found")
            }
            DbError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            DbError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, "validation_error", msg),
            DbError::NotConfigured => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "database_required",
                "Database not configured",
            ),
            _ => {
                tracing::error!(error = %err, "Database error");
                Self::internal("database_error", "An internal database error occurred")
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::BadUserRequest(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
            }
            EngineError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, "not_found", msg),
            EngineError::InvalidState(msg) => Self::new(StatusCode::CONFLICT, "invalid_state", msg),
            EngineError::Configuration(msg) => {
                Self::new(StatusCode::CONFLICT, "not_configured", msg)
            }
            EngineError::Forbidden(err) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
            EngineError::Db(err) => err.into(),
            EngineError::Config(err) => {
                tracing::error!(error = %err, "Configuration error");
                Self::internal("configuration_error", "The engine configuration is invalid")
            }
            EngineError::Json(err) => {
                tracing::error!(error = %err, "Serialization error");
                Self::internal("internal_error", "An internal error occurred")
            }
            EngineError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::internal("internal_error", "An internal error occurred")
            }
        }
    }
}
