//! Batches: bulk operations split into many small jobs.
//!
//! Creating a batch stores the full list of ids as a configuration byte
//! array and creates a seed job. Each seed run turns the next ids into
//! execution jobs of at most `invocations_per_batch_job` ids from a single
//! deployment. Once every execution job exists the seed is replaced by a
//! monitor job that polls until all execution jobs are gone and then
//! completes the batch.
//!
//! Every batch has three job definitions (seed, monitor, execution) whose
//! configuration is the batch id. Suspending a batch suspends them.

mod execution;
mod management;
mod monitor;
mod seed;

pub use execution::{BatchJobHandler, BatchOperation, execution_handlers};
pub use management::*;
pub use monitor::MonitorJobHandler;
pub use seed::SeedJobHandler;
use serde::{Deserialize, Serialize};

use crate::{
    engine::EngineContext,
    error::{EngineError, EngineResult},
    jobs::{self, job_types},
    models::{
        Batch, ByteArray, ByteArrayType, HistoricBatch, Job, JobDefinition, new_id,
    },
    observability::metrics,
    removal_time::{self, RemovalTimeUpdate},
};

/// Ids sharing a deployment, as a run within [`BatchConfiguration::ids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMapping {
    pub deployment_id: Option<String>,
    pub count: usize,
}

/// What a batch operates on. Stored as JSON in a byte array, both for the
/// whole batch and for the slice handled by each execution job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfiguration {
    /// Ordered so that ids of the same deployment are adjacent.
    pub ids: Vec<String>,
    #[serde(default)]
    pub deployment_mappings: Vec<DeploymentMapping>,
    /// Set for set-removal-time batches.
    #[serde(default)]
    pub removal_time: Option<RemovalTimeUpdate>,
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub fail_if_not_exists: bool,
}

impl BatchConfiguration {
    /// Build a configuration from ids paired with their deployment. Ids are
    /// grouped by deployment, keeping first-seen order; ids without a
    /// deployment come last.
    pub fn new(ids_with_deployment: Vec<(String, Option<String>)>) -> Self {
        let mut order: Vec<Option<String>> = Vec::new();
        for (_, deployment_id) in &ids_with_deployment {
            if deployment_id.is_some() && !order.contains(deployment_id) {
                order.push(deployment_id.clone());
            }
        }
        if ids_with_deployment.iter().any(|(_, d)| d.is_none()) {
            order.push(None);
        }

        let mut ids = Vec::with_capacity(ids_with_deployment.len());
        let mut deployment_mappings = Vec::with_capacity(order.len());
        for deployment_id in order {
            let group: Vec<String> = ids_with_deployment
                .iter()
                .filter(|(_, d)| *d == deployment_id)
                .map(|(id, _)| id.clone())
                .collect();
            deployment_mappings.push(DeploymentMapping {
                deployment_id,
                count: group.len(),
            });
            ids.extend(group);
        }

        Self {
            ids,
            deployment_mappings,
            removal_time: None,
            hierarchical: false,
            fail_if_not_exists: true,
        }
    }

    pub fn with_removal_time(mut self, update: RemovalTimeUpdate, hierarchical: bool) -> Self {
        self.removal_time = Some(update);
        self.hierarchical = hierarchical;
        self
    }

    pub fn with_fail_if_not_exists(mut self, fail_if_not_exists: bool) -> Self {
        self.fail_if_not_exists = fail_if_not_exists;
        self
    }

    /// The slice `[start, end)` of the ids, with its deployment mappings.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.ids.len());
        let mut mappings = Vec::new();
        let mut offset = 0;
        for mapping in &self.deployment_mappings {
            let (from, to) = (offset, offset + mapping.count);
            offset = to;
            let overlap = to.min(end).saturating_sub(from.max(start));
            if overlap > 0 {
                mappings.push(DeploymentMapping {
                    deployment_id: mapping.deployment_id.clone(),
                    count: overlap,
                });
            }
        }
        Self {
            ids: self.ids[start.min(end)..end].to_vec(),
            deployment_mappings: mappings,
            removal_time: self.removal_time,
            hierarchical: self.hierarchical,
            fail_if_not_exists: self.fail_if_not_exists,
        }
    }

    /// Ranges of `ids` per deployment. A configuration without mappings is
    /// one group with no deployment.
    fn groups(&self) -> Vec<(usize, usize, Option<String>)> {
        if self.deployment_mappings.is_empty() {
            return vec![(0, self.ids.len(), None)];
        }
        let mut offset = 0;
        self.deployment_mappings
            .iter()
            .map(|mapping| {
                let start = offset.min(self.ids.len());
                offset += mapping.count;
                (start, offset.min(self.ids.len()), mapping.deployment_id.clone())
            })
            .collect()
    }

    /// Number of execution jobs needed at `invocations` ids per job. Jobs
    /// never span two deployments.
    pub fn job_count(&self, invocations: usize) -> usize {
        let invocations = invocations.max(1);
        self.groups()
            .iter()
            .map(|(start, end, _)| (end - start).div_ceil(invocations))
            .sum()
    }

    /// Ids of the execution job at `job_index`, with their deployment.
    /// `None` once every job has been handed out.
    pub fn job_chunk(&self, job_index: usize, invocations: usize) -> Option<Self> {
        let invocations = invocations.max(1);
        let mut index = job_index;
        for (start, end, _) in self.groups() {
            let jobs = (end - start).div_ceil(invocations);
            if index < jobs {
                let from = start + index * invocations;
                return Some(self.slice(from, (from + invocations).min(end)));
            }
            index -= jobs;
        }
        None
    }

    /// Deployment of the execution job at `job_index`.
    pub fn job_deployment(&self, job_index: usize, invocations: usize) -> Option<String> {
        self.job_chunk(job_index, invocations)
            .and_then(|chunk| chunk.single_deployment())
    }

    /// The deployment shared by all ids, if there is exactly one.
    pub fn single_deployment(&self) -> Option<String> {
        match self.deployment_mappings.as_slice() {
            [only] => only.deployment_id.clone(),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Persist a configuration as a byte array owned by `batch_id`.
async fn store_configuration(
    ctx: &EngineContext,
    batch_id: &str,
    configuration: &BatchConfiguration,
) -> EngineResult<String> {
    let byte_array = ByteArray {
        id: new_id(),
        name: Some("batch.configuration".to_string()),
        bytes: configuration.to_bytes()?,
        byte_array_type: ByteArrayType::Batch,
        root_process_instance_id: None,
        batch_id: Some(batch_id.to_string()),
        create_time: ctx.now(),
        removal_time: None,
    };
    ctx.db.byte_arrays().insert(&byte_array).await?;
    Ok(byte_array.id)
}

async fn load_configuration(ctx: &EngineContext, byte_array_id: &str) -> EngineResult<BatchConfiguration> {
    let byte_array = ctx.db.byte_arrays().get(byte_array_id).await?.ok_or_else(|| {
        EngineError::InvalidState(format!(
            "Batch configuration '{}' no longer exists",
            byte_array_id
        ))
    })?;
    BatchConfiguration::from_bytes(&byte_array.bytes)
}

/// Batch id of a job, taken from its job definition.
async fn batch_id_of(ctx: &EngineContext, job: &Job) -> EngineResult<Option<String>> {
    let Some(definition_id) = job.job_definition_id.as_deref() else {
        return Ok(job.handler_configuration.clone());
    };
    Ok(ctx
        .db
        .jobs()
        .get_definition(definition_id)
        .await?
        .and_then(|definition| definition.job_configuration))
}

/// Due date of batch jobs: now, or open-ended when due dates may be null.
fn batch_job_due_date(ctx: &EngineContext) -> Option<chrono::DateTime<chrono::Utc>> {
    ctx.config
        .batch
        .ensure_job_due_date_not_null
        .then(|| ctx.now())
}

/// When a monitor job polls next.
fn next_poll(ctx: &EngineContext) -> EngineResult<chrono::DateTime<chrono::Utc>> {
    let poll_time = chrono::TimeDelta::from_std(ctx.config.batch.poll_time())
        .map_err(|e| EngineError::Internal(format!("Invalid batch poll time: {}", e)))?;
    Ok(ctx.now() + poll_time)
}

async fn create_job_definition(
    ctx: &EngineContext,
    job_type: &str,
    batch_id: &str,
) -> EngineResult<String> {
    let definition = JobDefinition {
        id: new_id(),
        job_type: job_type.to_string(),
        job_configuration: Some(batch_id.to_string()),
        suspended: false,
    };
    ctx.db.jobs().insert_definition(&definition).await?;
    Ok(definition.id)
}

/// Create a seed job for the batch. The seed runs in the deployment of the
/// next execution job it will create.
async fn create_seed_job(
    ctx: &EngineContext,
    batch: &Batch,
    deployment_id: Option<String>,
) -> EngineResult<Job> {
    let mut job = Job::new(new_id(), job_types::BATCH_SEED, ctx.default_retries(), ctx.now());
    job.job_definition_id = batch.seed_job_definition_id.clone();
    job.handler_configuration = Some(batch.id.clone());
    job.deployment_id = deployment_id;
    job.due_date = batch_job_due_date(ctx);
    job.suspended = batch.suspended;
    jobs::create_job(ctx, &job).await?;
    Ok(job)
}

/// Start a batch over `configuration.ids`.
///
/// Callers validate the ids and check the caller's permissions first.
pub async fn create_batch(
    ctx: &EngineContext,
    batch_type: &str,
    configuration: BatchConfiguration,
    create_user_id: Option<String>,
) -> EngineResult<Batch> {
    if configuration.ids.is_empty() {
        return Err(EngineError::bad_request("ids is empty"));
    }

    let invocations = ctx.config.batch.invocations_for(batch_type).max(1);
    let total = configuration.ids.len();
    let seed_deployment = configuration.job_deployment(0, invocations as usize);
    let id = new_id();

    let seed_definition = create_job_definition(ctx, job_types::BATCH_SEED, &id).await?;
    let monitor_definition = create_job_definition(ctx, job_types::BATCH_MONITOR, &id).await?;
    let batch_definition = create_job_definition(ctx, batch_type, &id).await?;
    let configuration_id = store_configuration(ctx, &id, &configuration).await?;

    let batch = Batch {
        id,
        batch_type: batch_type.to_string(),
        total_jobs: configuration.job_count(invocations as usize) as i64,
        jobs_created: 0,
        batch_jobs_per_seed: i64::from(ctx.config.batch.jobs_per_seed.max(1)),
        invocations_per_batch_job: i64::from(invocations),
        seed_job_definition_id: Some(seed_definition),
        monitor_job_definition_id: Some(monitor_definition),
        batch_job_definition_id: Some(batch_definition),
        configuration_byte_array_id: Some(configuration_id),
        create_user_id,
        suspended: false,
        start_time: ctx.now(),
        execution_start_time: None,
    };
    ctx.db.batches().insert(&batch).await?;
    let mut historic = HistoricBatch::from_batch(&batch);
    historic.removal_time = removal_time::for_batch(ctx, &historic);
    ctx.db.batches().insert_historic(&historic).await?;
    create_seed_job(ctx, &batch, seed_deployment).await?;

    metrics::record_batch_event(batch_type, "created");
    tracing::info!(
        batch_id = %batch.id,
        batch_type = %batch.batch_type,
        ids = total,
        total_jobs = batch.total_jobs,
        "Batch created"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pairs: &[(&str, Option<&str>)]) -> Vec<(String, Option<String>)> {
        pairs
            .iter()
            .map(|(id, d)| (id.to_string(), d.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_configuration_groups_ids_by_deployment() {
        let config = BatchConfiguration::new(ids(&[
            ("a", Some("d1")),
            ("b", Some("d2")),
            ("c", Some("d1")),
            ("d", None),
        ]));
        assert_eq!(config.ids, vec!["a", "c", "b", "d"]);
        assert_eq!(
            config.deployment_mappings.iter().map(|m| m.count).collect::<Vec<_>>(),
            vec![2, 1, 1]
        );
    }

    #[test]
    fn test_slice_keeps_deployment_of_uniform_chunks() {
        let config = BatchConfiguration::new(ids(&[
            ("a", Some("d1")),
            ("b", Some("d1")),
            ("c", Some("d2")),
        ]));

        let first = config.slice(0, 2);
        assert_eq!(first.ids, vec!["a", "b"]);
        assert_eq!(first.single_deployment().as_deref(), Some("d1"));

        let tail = config.slice(2, 10);
        assert_eq!(tail.ids, vec!["c"]);
        assert_eq!(tail.single_deployment().as_deref(), Some("d2"));
    }

    #[test]
    fn test_job_chunks_never_span_deployments() {
        let config = BatchConfiguration::new(ids(&[
            ("a", Some("d1")),
            ("b", Some("d1")),
            ("c", Some("d1")),
            ("d", Some("d2")),
            ("e", Some("d2")),
            ("f", Some("d2")),
        ]));
        assert_eq!(config.job_count(2), 4);

        let chunks: Vec<_> = (0..4).map(|i| config.job_chunk(i, 2).unwrap()).collect();
        assert_eq!(
            chunks.iter().map(|c| c.ids.clone()).collect::<Vec<_>>(),
            vec![vec!["a", "b"], vec!["c"], vec!["d", "e"], vec!["f"]]
        );
        assert_eq!(
            chunks.iter().map(|c| c.single_deployment()).collect::<Vec<_>>(),
            vec![
                Some("d1".to_string()),
                Some("d1".to_string()),
                Some("d2".to_string()),
                Some("d2".to_string()),
            ]
        );
        assert!(config.job_chunk(4, 2).is_none());
        assert_eq!(config.job_deployment(2, 2).as_deref(), Some("d2"));
    }

    #[test]
    fn test_ids_without_deployment_form_the_last_group() {
        let config = BatchConfiguration::new(ids(&[
            ("a", None),
            ("b", Some("d1")),
            ("c", None),
        ]));
        assert_eq!(config.ids, vec!["b", "a", "c"]);
        assert_eq!(config.job_count(5), 2);
        assert_eq!(config.job_deployment(0, 5).as_deref(), Some("d1"));
        let orphans = config.job_chunk(1, 5).unwrap();
        assert_eq!(orphans.ids, vec!["a", "c"]);
        assert_eq!(orphans.single_deployment(), None);
    }

    #[test]
    fn test_configuration_round_trips_removal_settings() {
        let config = BatchConfiguration::new(ids(&[("a", None)]))
            .with_removal_time(RemovalTimeUpdate::Calculated, true);
        let parsed = BatchConfiguration::from_bytes(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
