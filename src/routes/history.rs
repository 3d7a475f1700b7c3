//! History cleanup, bulk deletion and cleanable report endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, ListResponse, identity::Caller};
use crate::models::{
    Batch, CleanableDefinitionReport, CleanableReportQuery, HistoricDecisionInstanceQuery,
    HistoricProcessInstanceQuery, Job,
};

/// Query parameters for scheduling history cleanup.
#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    /// Schedule the cleanup job due now instead of at the next batch window.
    #[serde(default = "default_true")]
    pub immediately_due: bool,
}

fn default_true() -> bool {
    true
}

/// The scheduled cleanup job, if the engine created or found one.
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub job: Option<Job>,
}

/// Schedule history cleanup.
///
/// Returns the first cleanup job. Without `immediately_due`, the job is due at
/// the start of the next batch window, or not scheduled at all when no window
/// is configured.
#[tracing::instrument(name = "history.cleanup", skip(state, caller))]
pub async fn clean_up_history(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<CleanupParams>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let engine = caller.engine(&state.engine);
    let job = engine
        .history()
        .clean_up_history_async(params.immediately_due)
        .await?;
    Ok(Json(CleanupResponse { job }))
}

/// List the history cleanup jobs, one per degree of parallelism.
#[tracing::instrument(name = "history.cleanup_jobs", skip(state, caller))]
pub async fn list_cleanup_jobs(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<Job>>, ApiError> {
    let engine = caller.engine(&state.engine);
    let jobs = engine.history().find_history_cleanup_jobs().await?;
    Ok(Json(ListResponse::new(jobs)))
}

/// Request body for deleting historic process instances.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteProcessInstancesRequest {
    /// Ids to delete. Combined with the ids matched by `query`.
    pub process_instance_ids: Option<Vec<String>>,
    pub query: Option<HistoricProcessInstanceQuery>,
    /// Delete asynchronously in a batch. Defaults to `true`.
    #[serde(default = "default_true")]
    pub r#async: bool,
    /// Synchronous deletion only: skip ids that do not exist.
    #[serde(default)]
    pub fail_if_not_exists: Option<bool>,
}

/// Outcome of a delete request. Asynchronous deletes return their batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub batch: Option<Batch>,
}

/// Delete the history of finished process instances, synchronously or as a
/// batch.
#[tracing::instrument(name = "history.delete_process_instances", skip(state, caller, body))]
pub async fn delete_process_instances(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<DeleteProcessInstancesRequest>,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    let engine = caller.engine(&state.engine);
    let history = engine.history();

    if body.r#async {
        let batch = history
            .delete_historic_process_instances_async(
                body.process_instance_ids.as_deref(),
                body.query.as_ref(),
            )
            .await?;
        return Ok((StatusCode::ACCEPTED, Json(DeleteResponse { batch: Some(batch) })));
    }

    let ids = body.process_instance_ids.as_deref();
    if body.fail_if_not_exists == Some(false) {
        history.delete_historic_process_instances_if_exists(ids).await?;
    } else {
        history.delete_historic_process_instances(ids).await?;
    }
    Ok((StatusCode::OK, Json(DeleteResponse { batch: None })))
}

/// Request body for deleting historic decision instances.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteDecisionInstancesRequest {
    pub decision_instance_ids: Option<Vec<String>>,
    pub query: Option<HistoricDecisionInstanceQuery>,
    /// Synchronous only: delete every instance of this decision definition.
    pub decision_definition_id: Option<String>,
    #[serde(default = "default_true")]
    pub r#async: bool,
}

/// Delete the history of decision evaluations, synchronously or as a batch.
#[tracing::instrument(name = "history.delete_decision_instances", skip(state, caller, body))]
pub async fn delete_decision_instances(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<DeleteDecisionInstancesRequest>,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    let engine = caller.engine(&state.engine);
    let history = engine.history();

    if body.r#async {
        let batch = history
            .delete_historic_decision_instances_async(
                body.decision_instance_ids.as_deref(),
                body.query.as_ref(),
            )
            .await?;
        return Ok((StatusCode::ACCEPTED, Json(DeleteResponse { batch: Some(batch) })));
    }

    if body.decision_instance_ids.is_none() {
        history
            .delete_historic_decision_instance_by_definition_id(
                body.decision_definition_id.as_deref(),
            )
            .await?;
    } else {
        history
            .delete_historic_decision_instances_bulk(body.decision_instance_ids.as_deref())
            .await?;
    }
    Ok((StatusCode::OK, Json(DeleteResponse { batch: None })))
}

/// Query parameters for the cleanable report.
#[derive(Debug, Default, Deserialize)]
pub struct CleanableReportParams {
    pub definition_id: Option<String>,
    pub definition_key: Option<String>,
    /// Omit definitions without finished instances.
    #[serde(default)]
    pub compact: bool,
}

impl From<CleanableReportParams> for CleanableReportQuery {
    fn from(params: CleanableReportParams) -> Self {
        Self {
            definition_ids: params.definition_id.map(|id| vec![id]),
            definition_keys: params.definition_key.map(|key| vec![key]),
            compact: params.compact,
        }
    }
}

/// Report finished and cleanable process instances per process definition.
#[tracing::instrument(name = "history.cleanable_process_report", skip(state, caller))]
pub async fn cleanable_process_report(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<CleanableReportParams>,
) -> Result<Json<ListResponse<CleanableDefinitionReport>>, ApiError> {
    let engine = caller.engine(&state.engine);
    let report = engine
        .history()
        .cleanable_process_instance_report(&params.into())
        .await?;
    Ok(Json(ListResponse::new(report)))
}
