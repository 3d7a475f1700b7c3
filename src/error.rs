use thiserror::Error;

use crate::{authz::AuthzError, config::ConfigError, db::DbError};

/// Errors raised by engine services and job handlers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller passed invalid input (null or empty id lists, unknown ids).
    #[error("{0}")]
    BadUserRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The operation conflicts with the current state of an entity,
    /// e.g. deleting the history of a running process instance.
    #[error("{0}")]
    InvalidState(String),

    /// The engine configuration does not permit the operation.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadUserRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Fail with a bad-request error when `value` is `None`.
pub fn ensure_not_null<'a, T>(value: Option<&'a T>, name: &str) -> EngineResult<&'a T> {
    value.ok_or_else(|| EngineError::bad_request(format!("{} is null", name)))
}

/// Fail with a bad-request error when `values` is `None` or empty.
pub fn ensure_not_empty<'a, T>(values: Option<&'a [T]>, name: &str) -> EngineResult<&'a [T]> {
    let values = values.ok_or_else(|| EngineError::bad_request(format!("{} is null", name)))?;
    if values.is_empty() {
        return Err(EngineError::bad_request(format!("{} is empty", name)));
    }
    Ok(values)
}
