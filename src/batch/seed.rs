use async_trait::async_trait;

use super::{
    batch_job_due_date, create_seed_job, load_configuration, next_poll, store_configuration,
};
use crate::{
    engine::EngineContext,
    error::EngineResult,
    jobs::{self, JobHandler, JobOutcome, job_types},
    models::{Batch, Job, new_id},
};

/// Turns the next chunks of a batch's ids into execution jobs, one
/// deployment per job.
pub struct SeedJobHandler;

#[async_trait]
impl JobHandler for SeedJobHandler {
    fn job_type(&self) -> &'static str {
        job_types::BATCH_SEED
    }

    async fn execute(&self, ctx: &EngineContext, job: &Job) -> EngineResult<JobOutcome> {
        let Some(batch_id) = job.handler_configuration.as_deref() else {
            return Ok(JobOutcome::Done);
        };
        let Some(mut batch) = ctx.db.batches().get(batch_id).await? else {
            tracing::warn!(batch_id, "Seed job for a batch that no longer exists");
            return Ok(JobOutcome::Done);
        };
        let Some(configuration_id) = batch.configuration_byte_array_id.clone() else {
            return Ok(JobOutcome::Done);
        };
        let configuration = load_configuration(ctx, &configuration_id).await?;

        let invocations = batch.invocations_per_batch_job.max(1) as usize;
        let remaining = (batch.total_jobs - batch.jobs_created).max(0);
        let to_create = remaining.min(batch.batch_jobs_per_seed);

        for _ in 0..to_create {
            let Some(chunk) = configuration.job_chunk(batch.jobs_created as usize, invocations)
            else {
                break;
            };
            create_execution_job(ctx, &batch, &chunk).await?;
            batch.jobs_created += 1;
        }
        ctx.db.batches().update(&batch).await?;

        if batch.jobs_created < batch.total_jobs {
            let deployment = configuration.job_deployment(batch.jobs_created as usize, invocations);
            create_seed_job(ctx, &batch, deployment).await?;
        } else {
            create_monitor_job(ctx, &batch).await?;
        }

        tracing::debug!(
            batch_id = %batch.id,
            created = to_create,
            jobs_created = batch.jobs_created,
            total_jobs = batch.total_jobs,
            "Batch seed job executed"
        );
        Ok(JobOutcome::Done)
    }
}

async fn create_execution_job(
    ctx: &EngineContext,
    batch: &Batch,
    chunk: &super::BatchConfiguration,
) -> EngineResult<()> {
    let byte_array_id = store_configuration(ctx, &batch.id, chunk).await?;
    let mut job = Job::new(new_id(), batch.batch_type.clone(), ctx.default_retries(), ctx.now());
    job.job_definition_id = batch.batch_job_definition_id.clone();
    job.handler_configuration = Some(byte_array_id);
    job.deployment_id = chunk.single_deployment();
    job.due_date = batch_job_due_date(ctx);
    job.suspended = batch.suspended;
    jobs::create_job(ctx, &job).await
}

/// The monitor first polls one poll interval after the last execution job
/// was created.
async fn create_monitor_job(ctx: &EngineContext, batch: &Batch) -> EngineResult<()> {
    let mut job = Job::new(new_id(), job_types::BATCH_MONITOR, ctx.default_retries(), ctx.now());
    job.job_definition_id = batch.monitor_job_definition_id.clone();
    job.handler_configuration = Some(batch.id.clone());
    job.due_date = Some(next_poll(ctx)?);
    job.suspended = batch.suspended;
    jobs::create_job(ctx, &job).await
}
