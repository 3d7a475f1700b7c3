use std::{error::Error as _, sync::Arc, time::Instant};

use super::{JobHandlerRegistry, JobLogContext, JobOutcome, write_job_log};
use crate::{
    engine::EngineContext,
    error::{EngineError, EngineResult},
    models::{
        ByteArray, ByteArrayType, FAILED_JOB_INCIDENT, HistoricIncident, Incident, Job,
        JobLogState, metric_names, new_id,
    },
    observability::metrics,
};

/// Upper bound on acquisition rounds in [`JobExecutor::run_due_jobs`], so a
/// handler that keeps rescheduling itself as due cannot spin forever.
const MAX_ROUNDS: usize = 10_000;

/// Runs persisted jobs through their handlers and records the outcome.
pub struct JobExecutor {
    ctx: Arc<EngineContext>,
    handlers: JobHandlerRegistry,
}

impl JobExecutor {
    pub fn new(ctx: Arc<EngineContext>, handlers: JobHandlerRegistry) -> Self {
        Self { ctx, handlers }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Execute a job now, regardless of its due date.
    ///
    /// A failure is recorded on the job (retries, exception, incident) and
    /// then returned to the caller.
    pub async fn execute_job(&self, job_id: &str) -> EngineResult<()> {
        let job = self
            .ctx
            .db
            .jobs()
            .get(job_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("No job found with id '{}'", job_id)))?;
        self.run(job).await
    }

    /// Acquire one round of due jobs and execute them. Failures are recorded
    /// and logged, not returned. Returns the number of jobs executed.
    pub async fn acquire_and_execute_once(&self) -> EngineResult<usize> {
        let limit = i64::from(self.ctx.config.job_executor.max_jobs_per_acquisition);
        let jobs = self
            .ctx
            .db
            .jobs()
            .find_acquirable(self.ctx.now(), limit)
            .await?;

        let count = jobs.len();
        for job in jobs {
            let job_id = job.id.clone();
            if let Err(e) = self.run(job).await {
                tracing::warn!(job_id = %job_id, error = %e, "Job execution failed");
            }
        }
        Ok(count)
    }

    /// Execute due jobs until none are left. Returns the number of executions.
    pub async fn run_due_jobs(&self) -> EngineResult<usize> {
        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            let executed = self.acquire_and_execute_once().await?;
            if executed == 0 {
                return Ok(total);
            }
            total += executed;
        }
        tracing::warn!(
            executions = total,
            "Stopped executing due jobs after {} rounds; jobs keep rescheduling themselves as due",
            MAX_ROUNDS
        );
        Ok(total)
    }

    async fn run(&self, job: Job) -> EngineResult<()> {
        let ctx = self.ctx.as_ref();
        let start = Instant::now();
        // Resolved up front: finishing a job may delete its definition.
        let log_context = JobLogContext::resolve(ctx, &job).await?;

        let result = match self.handlers.get(&job.job_type) {
            Some(handler) => handler.execute(ctx, &job).await,
            None => Err(EngineError::Internal(format!(
                "No job handler registered for job type '{}'",
                job.job_type
            ))),
        };
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                self.complete(&job, outcome, &log_context).await?;
                metrics::record_job_execution(&job.job_type, "success", duration);
                ctx.record_meter(metric_names::JOB_SUCCESSFUL, 1).await?;
                tracing::debug!(job_id = %job.id, job_type = %job.job_type, "Job executed");
                Ok(())
            }
            Err(error) => {
                metrics::record_job_execution(&job.job_type, "failure", duration);
                if let Err(record_error) = self.record_failure(job, &error, &log_context).await {
                    tracing::error!(error = %record_error, "Failed to record job failure");
                }
                ctx.record_meter(metric_names::JOB_FAILED, 1).await?;
                Err(error)
            }
        }
    }

    async fn complete(
        &self,
        job: &Job,
        outcome: JobOutcome,
        log_context: &JobLogContext,
    ) -> EngineResult<()> {
        let ctx = self.ctx.as_ref();
        let jobs = ctx.db.jobs();

        write_job_log(ctx, job, JobLogState::Successful, log_context, None).await?;
        if job.retries <= 0 {
            jobs.delete_incidents_for_job(&job.id).await?;
            ctx.db
                .process_history()
                .end_incidents_for_configuration(&job.id, ctx.now())
                .await?;
        }

        match outcome {
            JobOutcome::Done => {
                jobs.delete(&job.id).await?;
                if let Some(byte_array_id) = &job.exception_byte_array_id {
                    ctx.db.byte_arrays().delete(byte_array_id).await?;
                }
            }
            JobOutcome::Rescheduled(next) => {
                if let Some(old) = &job.exception_byte_array_id
                    && next.exception_byte_array_id.as_ref() != Some(old)
                {
                    ctx.db.byte_arrays().delete(old).await?;
                }
                jobs.update(&next).await?;
            }
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        mut job: Job,
        error: &EngineError,
        log_context: &JobLogContext,
    ) -> EngineResult<()> {
        let ctx = self.ctx.as_ref();
        let now = ctx.now();
        let stacktrace = render_error_chain(error);

        // The job may have been removed by the failing handler.
        if let Some(current) = ctx.db.jobs().get(&job.id).await? {
            job = current;
        }
        let old_byte_array_id = job.exception_byte_array_id.take();

        let exception = new_exception_byte_array(&stacktrace, log_context, now);
        ctx.db.byte_arrays().insert(&exception).await?;
        if let Some(old) = old_byte_array_id {
            ctx.db.byte_arrays().delete(&old).await?;
        }

        job.retries = (job.retries - 1).max(0);
        job.exception_message = Some(error.to_string());
        job.exception_byte_array_id = Some(exception.id.clone());
        ctx.db.jobs().update(&job).await?;

        let log_exception = new_exception_byte_array(&stacktrace, log_context, now);
        ctx.db.byte_arrays().insert(&log_exception).await?;
        write_job_log(
            ctx,
            &job,
            JobLogState::Failed,
            log_context,
            Some(log_exception.id),
        )
        .await?;

        tracing::warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            retries = job.retries,
            error = %error,
            "Job failed"
        );

        if job.retries == 0 {
            self.raise_incident(&job, log_context).await?;
        }
        Ok(())
    }

    async fn raise_incident(&self, job: &Job, log_context: &JobLogContext) -> EngineResult<()> {
        let ctx = self.ctx.as_ref();
        let now = ctx.now();
        let incident = Incident {
            id: new_id(),
            incident_type: FAILED_JOB_INCIDENT.to_string(),
            message: job.exception_message.clone(),
            configuration: job.id.clone(),
            job_definition_id: job.job_definition_id.clone(),
            process_instance_id: job.process_instance_id.clone(),
            create_time: now,
        };
        ctx.db.jobs().insert_incident(&incident).await?;

        let historic = HistoricIncident {
            id: incident.id.clone(),
            incident_type: incident.incident_type.clone(),
            message: incident.message.clone(),
            configuration: Some(job.id.clone()),
            job_definition_id: job.job_definition_id.clone(),
            process_instance_id: job.process_instance_id.clone(),
            root_process_instance_id: None,
            batch_id: log_context.batch_id.clone(),
            create_time: now,
            end_time: None,
            removal_time: None,
        };
        ctx.db.process_history().insert_incident(&historic).await?;

        metrics::record_job_incident(&job.job_type);
        tracing::error!(job_id = %job.id, job_type = %job.job_type, "Job has no retries left, incident raised");
        Ok(())
    }
}

fn new_exception_byte_array(
    stacktrace: &str,
    log_context: &JobLogContext,
    now: chrono::DateTime<chrono::Utc>,
) -> ByteArray {
    ByteArray {
        id: new_id(),
        name: Some("job.exceptionByteArray".to_string()),
        bytes: stacktrace.as_bytes().to_vec(),
        byte_array_type: ByteArrayType::JobException,
        root_process_instance_id: None,
        batch_id: log_context.batch_id.clone(),
        create_time: now,
        removal_time: None,
    }
}

/// The error message followed by each of its sources.
fn render_error_chain(error: &EngineError) -> String {
    let mut rendered = format!("{error}");
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\nCaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
