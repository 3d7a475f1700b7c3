use async_trait::async_trait;

use super::next_poll;
use crate::{
    engine::EngineContext,
    error::EngineResult,
    jobs::{self, JobHandler, JobOutcome, job_types},
    models::{Batch, HistoricBatch, Job, JobQuery},
    observability::metrics,
    removal_time,
};

/// Polls a batch until its execution jobs are gone, then completes it.
pub struct MonitorJobHandler;

#[async_trait]
impl JobHandler for MonitorJobHandler {
    fn job_type(&self) -> &'static str {
        job_types::BATCH_MONITOR
    }

    async fn execute(&self, ctx: &EngineContext, job: &Job) -> EngineResult<JobOutcome> {
        let Some(batch_id) = job.handler_configuration.as_deref() else {
            return Ok(JobOutcome::Done);
        };
        let Some(batch) = ctx.db.batches().get(batch_id).await? else {
            tracing::warn!(batch_id, "Monitor job for a batch that no longer exists");
            return Ok(JobOutcome::Done);
        };

        let pending = match batch.batch_job_definition_id.as_deref() {
            Some(definition_id) => {
                ctx.db
                    .jobs()
                    .count(&JobQuery::by_definition(definition_id))
                    .await?
            }
            None => 0,
        };

        if pending > 0 {
            let mut next = job.clone();
            next.due_date = Some(next_poll(ctx)?);
            tracing::debug!(batch_id = %batch.id, pending, "Batch still has execution jobs");
            return Ok(JobOutcome::Rescheduled(next));
        }

        complete_batch(ctx, &batch, false, Some(&job.id)).await?;
        Ok(JobOutcome::Done)
    }
}

/// Remove the runtime state of a batch: its jobs, job definitions and
/// configuration. The historic batch is completed, or deleted with all its
/// history when `cascade_history` is set.
///
/// `skip_job_id` names a job the caller removes itself.
pub(super) async fn complete_batch(
    ctx: &EngineContext,
    batch: &Batch,
    cascade_history: bool,
    skip_job_id: Option<&str>,
) -> EngineResult<()> {
    let job_repo = ctx.db.jobs();
    let definitions = [
        batch.seed_job_definition_id.as_deref(),
        batch.monitor_job_definition_id.as_deref(),
        batch.batch_job_definition_id.as_deref(),
    ];

    for definition_id in definitions.into_iter().flatten() {
        for job in job_repo.list(&JobQuery::by_definition(definition_id)).await? {
            if Some(job.id.as_str()) == skip_job_id {
                continue;
            }
            // Execution jobs reference their slice of the configuration.
            if job.job_type == batch.batch_type
                && let Some(byte_array_id) = &job.handler_configuration
            {
                ctx.db.byte_arrays().delete(byte_array_id).await?;
            }
            jobs::delete_job(ctx, &job).await?;
        }
        job_repo.delete_definition(definition_id).await?;
    }

    if let Some(configuration_id) = &batch.configuration_byte_array_id {
        ctx.db.byte_arrays().delete(configuration_id).await?;
    }
    ctx.db.batches().delete(&batch.id).await?;

    if cascade_history {
        ctx.db
            .batches()
            .delete_historic_cascade(std::slice::from_ref(&batch.id))
            .await?;
        metrics::record_batch_event(&batch.batch_type, "deleted");
        tracing::info!(batch_id = %batch.id, "Batch deleted with its history");
        return Ok(());
    }

    let end_time = ctx.now();
    let mut historic = match ctx.db.batches().get_historic(&batch.id).await? {
        Some(historic) => historic,
        None => HistoricBatch::from_batch(batch),
    };
    historic.end_time = Some(end_time);
    let removal = removal_time::for_batch(ctx, &historic);
    ctx.db
        .batches()
        .complete_historic(&batch.id, end_time, removal)
        .await?;
    if removal.is_some() {
        ctx.db.batches().set_removal_time(&batch.id, removal).await?;
    }

    metrics::record_batch_event(&batch.batch_type, "completed");
    tracing::info!(
        batch_id = %batch.id,
        batch_type = %batch.batch_type,
        removal_time = ?removal,
        "Batch completed"
    );
    Ok(())
}
