//! HTTP API.
//!
//! A thin JSON layer over the engine services. Every handler runs its
//! service calls as the caller named in the identity headers (see
//! [`identity`]).

mod batches;
mod error;
mod health;
mod history;
pub mod identity;

#[cfg(all(test, feature = "database-sqlite"))]
mod tests;

use std::time::Instant;

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
pub use error::{ApiError, ErrorResponse};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{engine::Engine, observability::metrics};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

/// List response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Build the application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/history/cleanup", post(history::clean_up_history))
        .route("/history/cleanup/jobs", get(history::list_cleanup_jobs))
        .route(
            "/history/process-instances/delete",
            post(history::delete_process_instances),
        )
        .route(
            "/history/decision-instances/delete",
            post(history::delete_decision_instances),
        )
        .route(
            "/history/cleanable-reports/process",
            get(history::cleanable_process_report),
        )
        .route("/batches", get(batches::list))
        .route("/batches/{id}", get(batches::get).delete(batches::delete))
        .route("/batches/{id}/statistics", get(batches::statistics))
        .route("/jobs/{id}/execute", post(batches::execute_job))
        .layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record request count and latency per matched route.
async fn track_http_metrics(req: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    metrics::record_http_request(&method, &path, status, start_time.elapsed().as_secs_f64());
    response
}
