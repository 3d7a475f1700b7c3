use super::{HistoryCleanupJobConfig, minute_chunks};
use crate::{
    engine::EngineContext,
    error::EngineResult,
    jobs::{self, job_types},
    models::{Job, JobQuery, new_id},
};

/// Cleanup jobs ordered by the start of their minute range.
pub async fn find_jobs(ctx: &EngineContext) -> EngineResult<Vec<Job>> {
    let mut jobs = ctx
        .db
        .jobs()
        .list(&JobQuery::by_type(job_types::HISTORY_CLEANUP))
        .await?;
    jobs.sort_by_key(|job| {
        HistoryCleanupJobConfig::parse(job.handler_configuration.as_deref())
            .map_or(u32::MAX, |config| config.minute_from)
    });
    Ok(jobs)
}

/// Create or reconfigure one cleanup job per minute chunk.
///
/// Jobs are due now when `immediately_due`, otherwise at the start of the
/// current or next batch window. Without a window and without an immediate
/// request the existing jobs are suspended. Returns the first job.
pub async fn schedule(ctx: &EngineContext, immediately_due: bool) -> EngineResult<Option<Job>> {
    let now = ctx.now();
    let existing = find_jobs(ctx).await?;

    let due_date = if immediately_due {
        Some(now)
    } else {
        ctx.windows.current_or_next_window(now).map(|w| w.start)
    };
    let Some(due_date) = due_date else {
        suspend_jobs(ctx, existing).await?;
        return Ok(find_jobs(ctx).await?.into_iter().next());
    };

    let degree = u32::try_from(ctx.config.history_cleanup.degree_of_parallelism).unwrap_or(1);
    let chunks = minute_chunks(degree);
    let mut existing = existing.into_iter();

    for (minute_from, minute_to) in chunks {
        let config = HistoryCleanupJobConfig::new(minute_from, minute_to, immediately_due);
        match existing.next() {
            Some(mut job) => {
                if let Some(byte_array_id) = job.exception_byte_array_id.take() {
                    ctx.db.byte_arrays().delete(&byte_array_id).await?;
                }
                job.handler_configuration = Some(config.to_json()?);
                job.retries = ctx.cleanup_retries();
                job.exception_message = None;
                job.due_date = Some(due_date);
                job.suspended = false;
                ctx.db.jobs().update(&job).await?;
            }
            None => {
                let mut job = Job::new(new_id(), job_types::HISTORY_CLEANUP, ctx.cleanup_retries(), now);
                job.handler_configuration = Some(config.to_json()?);
                job.due_date = Some(due_date);
                jobs::create_job(ctx, &job).await?;
            }
        }
    }

    for surplus in existing {
        jobs::delete_job(ctx, &surplus).await?;
    }

    tracing::info!(
        degree,
        immediately_due,
        due_date = %due_date,
        "History cleanup jobs scheduled"
    );
    Ok(find_jobs(ctx).await?.into_iter().next())
}

async fn suspend_jobs(ctx: &EngineContext, jobs: Vec<Job>) -> EngineResult<()> {
    let count = jobs.len();
    for mut job in jobs {
        job.suspended = true;
        job.due_date = None;
        ctx.db.jobs().update(&job).await?;
    }
    if count > 0 {
        tracing::info!(count, "History cleanup jobs suspended, no batch window configured");
    }
    Ok(())
}

/// Align cleanup jobs with the configuration at engine start.
pub async fn bootstrap(ctx: &EngineContext) -> EngineResult<()> {
    if ctx.config.history_cleanup.enabled && ctx.windows.is_window_configured() {
        schedule(ctx, false).await?;
    } else {
        suspend_jobs(ctx, find_jobs(ctx).await?).await?;
    }
    Ok(())
}
