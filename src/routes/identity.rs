//! Caller identity for API requests.
//!
//! The engine sits behind a trusted proxy that authenticates users and
//! forwards the result in two headers:
//! - `X-User-Id`: the authenticated user id
//! - `X-User-Groups`: the user's groups, as a JSON array or comma-separated list
//!
//! Requests without `X-User-Id` run unauthenticated, which authorization
//! treats like the engine itself.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{engine::Engine, models::Authentication};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_GROUPS_HEADER: &str = "x-user-groups";

/// The authenticated caller of a request, if any.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Authentication>);

impl Caller {
    /// An engine handle that performs every call as this caller.
    pub fn engine(&self, engine: &Engine) -> Engine {
        match &self.0 {
            Some(auth) => engine.with_authentication(auth.clone()),
            None => engine.clone(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|a| a.user_id.as_str())
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl Caller {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let Some(user_id) = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Self(None);
        };
        Self(Some(
            Authentication::new(user_id).with_groups(extract_groups(headers)),
        ))
    }
}

fn extract_groups(headers: &axum::http::HeaderMap) -> Vec<String> {
    let Some(value) = headers.get(USER_GROUPS_HEADER).and_then(|v| v.to_str().ok()) else {
        return Vec::new();
    };
    if let Ok(groups) = serde_json::from_str::<Vec<String>>(value) {
        return groups;
    }
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
