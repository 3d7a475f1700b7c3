//! Batch and job management endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::{ApiError, AppState, ListResponse, identity::Caller};
use crate::models::{Batch, BatchStatistics};

#[tracing::instrument(name = "batches.list", skip(state, caller))]
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<Batch>>, ApiError> {
    let engine = caller.engine(&state.engine);
    let batches = engine.management().list_batches().await?;
    Ok(Json(ListResponse::new(batches)))
}

#[tracing::instrument(name = "batches.get", skip(state, caller))]
pub async fn get(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Batch>, ApiError> {
    let engine = caller.engine(&state.engine);
    Ok(Json(engine.management().get_batch(&id).await?))
}

/// Remaining, completed and failed execution jobs of a batch.
#[tracing::instrument(name = "batches.statistics", skip(state, caller))]
pub async fn statistics(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<BatchStatistics>, ApiError> {
    let engine = caller.engine(&state.engine);
    Ok(Json(engine.management().batch_statistics(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteBatchParams {
    /// Also delete the historic batch and its job logs.
    #[serde(default)]
    pub cascade: bool,
}

#[tracing::instrument(name = "batches.delete", skip(state, caller))]
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<DeleteBatchParams>,
) -> Result<StatusCode, ApiError> {
    let engine = caller.engine(&state.engine);
    engine.management().delete_batch(&id, params.cascade).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Execute a job now, regardless of its due date.
#[tracing::instrument(name = "jobs.execute", skip(state, caller))]
pub async fn execute_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let engine = caller.engine(&state.engine);
    engine.management().execute_job(Some(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
