use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{BatchWindow, HistoryCleanupJobConfig};
use crate::{
    db::CleanupCriteria,
    engine::EngineContext,
    error::EngineResult,
    jobs::{JobHandler, JobOutcome, job_types},
    models::{Job, metric_names},
    observability::metrics,
};

/// Rows removed by one cleanup run, per entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupRunResult {
    pub process_instances: u64,
    pub decision_instances: u64,
    pub case_instances: u64,
    pub batches: u64,
    pub job_logs: u64,
    /// Top-level ids selected for removal.
    pub fetched: usize,
}

impl CleanupRunResult {
    pub fn has_deletions(&self) -> bool {
        self.process_instances > 0
            || self.decision_instances > 0
            || self.case_instances > 0
            || self.batches > 0
            || self.job_logs > 0
    }
}

/// Executes `history-cleanup` jobs.
pub struct HistoryCleanupHandler;

#[async_trait]
impl JobHandler for HistoryCleanupHandler {
    fn job_type(&self) -> &'static str {
        job_types::HISTORY_CLEANUP
    }

    async fn execute(&self, ctx: &EngineContext, job: &Job) -> EngineResult<JobOutcome> {
        let config = HistoryCleanupJobConfig::parse(job.handler_configuration.as_deref())?;
        let now = ctx.now();
        let window = ctx.windows.current_or_next_window(now);
        let in_window = window.is_some_and(|w| w.is_within(now));

        let result = if config.immediately_due || in_window {
            let result = run_cleanup(ctx, &config, now).await?;
            record_removals(ctx, &result).await?;
            tracing::info!(
                job_id = %job.id,
                minute_from = config.minute_from,
                minute_to = config.minute_to,
                process_instances = result.process_instances,
                decision_instances = result.decision_instances,
                case_instances = result.case_instances,
                batches = result.batches,
                job_logs = result.job_logs,
                "History cleanup run complete"
            );
            Some(result)
        } else {
            tracing::debug!(job_id = %job.id, "History cleanup job ran outside of a batch window");
            None
        };

        let threshold = ctx.config.history_cleanup.batch_threshold;
        let above_threshold = result.is_some_and(|r| r.fetched as i64 >= threshold);
        let next = reschedule(ctx, job, config, above_threshold, window, now)?;
        Ok(JobOutcome::Rescheduled(next))
    }
}

/// Select and delete one batch of rows in the job's minute range.
///
/// The batch is filled entity type by entity type: process instances first,
/// then decision instances, case instances, historic batches and finally
/// the job logs of cleanup jobs.
pub async fn run_cleanup(
    ctx: &EngineContext,
    config: &HistoryCleanupJobConfig,
    now: DateTime<Utc>,
) -> EngineResult<CleanupRunResult> {
    let batch_size = ctx.config.history_cleanup.batch_size;
    let mut criteria = CleanupCriteria {
        strategy: ctx.config.history_cleanup.strategy,
        now,
        minute_from: config.minute_from,
        minute_to: config.minute_to,
        batch_size,
    };
    let mut result = CleanupRunResult::default();

    let process_ids = ctx.db.process_history().find_ids_for_cleanup(&criteria).await?;
    fill(&mut criteria, &mut result, process_ids.len());

    let decision_ids = if criteria.batch_size > 0 {
        ctx.db.decision_history().find_ids_for_cleanup(&criteria).await?
    } else {
        Vec::new()
    };
    fill(&mut criteria, &mut result, decision_ids.len());

    let case_ids = if criteria.batch_size > 0 {
        ctx.db.case_history().find_ids_for_cleanup(&criteria).await?
    } else {
        Vec::new()
    };
    fill(&mut criteria, &mut result, case_ids.len());

    let batch_ids = if criteria.batch_size > 0 {
        ctx.db
            .batches()
            .find_ids_for_cleanup(&criteria, &ctx.batch_ttl)
            .await?
    } else {
        Vec::new()
    };
    fill(&mut criteria, &mut result, batch_ids.len());

    let job_log_ids = match ctx.job_log_ttl_days {
        Some(days) if criteria.batch_size > 0 => {
            let cutoff = now - Duration::days(i64::from(days));
            ctx.db
                .job_logs()
                .find_ids_for_cleanup(job_types::HISTORY_CLEANUP, cutoff, &criteria)
                .await?
        }
        _ => Vec::new(),
    };
    fill(&mut criteria, &mut result, job_log_ids.len());

    if !process_ids.is_empty() {
        result.process_instances = ctx.db.process_history().delete_cascade(&process_ids).await?;
    }
    if !decision_ids.is_empty() {
        result.decision_instances = ctx.db.decision_history().delete_cascade(&decision_ids).await?;
    }
    if !case_ids.is_empty() {
        result.case_instances = ctx.db.case_history().delete_cascade(&case_ids).await?;
    }
    if !batch_ids.is_empty() {
        result.batches = ctx.db.batches().delete_historic_cascade(&batch_ids).await?;
    }
    if !job_log_ids.is_empty() {
        result.job_logs = ctx.db.job_logs().delete_cascade(&job_log_ids).await?;
    }

    Ok(result)
}

fn fill(criteria: &mut CleanupCriteria, result: &mut CleanupRunResult, fetched: usize) {
    result.fetched += fetched;
    criteria.batch_size = (criteria.batch_size - fetched as i64).max(0);
}

async fn record_removals(ctx: &EngineContext, result: &CleanupRunResult) -> EngineResult<()> {
    let removals = [
        (
            metric_names::HISTORY_CLEANUP_REMOVED_PROCESS_INSTANCES,
            "process_instances",
            result.process_instances,
        ),
        (
            metric_names::HISTORY_CLEANUP_REMOVED_DECISION_INSTANCES,
            "decision_instances",
            result.decision_instances,
        ),
        (
            metric_names::HISTORY_CLEANUP_REMOVED_CASE_INSTANCES,
            "case_instances",
            result.case_instances,
        ),
        (
            metric_names::HISTORY_CLEANUP_REMOVED_BATCH_OPERATIONS,
            "batch_operations",
            result.batches,
        ),
    ];
    for (meter, entity, count) in removals {
        metrics::record_history_cleanup_removed(entity, count);
        ctx.record_meter(meter, count as i64).await?;
    }
    metrics::record_history_cleanup_removed("job_logs", result.job_logs);
    Ok(())
}

/// Work out the next run of a cleanup job.
///
/// A full batch means more data is waiting, so the job is due again at once.
/// Otherwise the job backs off inside the current window, or waits for the
/// next window; without any window it is suspended.
fn reschedule(
    ctx: &EngineContext,
    job: &Job,
    mut config: HistoryCleanupJobConfig,
    above_threshold: bool,
    window: Option<BatchWindow>,
    now: DateTime<Utc>,
) -> EngineResult<Job> {
    let mut next = job.clone();
    next.retries = ctx.cleanup_retries();
    next.exception_message = None;
    next.exception_byte_array_id = None;
    next.suspended = false;

    if above_threshold {
        config.count_empty_runs = 0;
        next.due_date = Some(now);
    } else {
        config.immediately_due = false;
        match window {
            Some(current) if current.is_within(now) => {
                let delayed = config.next_run_with_delay(now);
                if current.is_within(delayed) {
                    config.count_empty_runs += 1;
                    next.due_date = Some(delayed);
                } else {
                    config.count_empty_runs = 0;
                    next.due_date = ctx.windows.next_window(now).map(|w| w.start);
                }
            }
            Some(upcoming) => {
                config.count_empty_runs = 0;
                next.due_date = Some(upcoming.start);
            }
            None => {
                config.count_empty_runs = 0;
                next.due_date = None;
                next.suspended = true;
            }
        }
    }

    if next.due_date.is_none() && !next.suspended {
        next.suspended = true;
    }
    next.handler_configuration = Some(config.to_json()?);
    Ok(next)
}
