//! Asynchronous job infrastructure.
//!
//! Work that must survive a restart (history cleanup runs, batch seeding,
//! batch execution and monitoring) is persisted as a [`Job`] row and picked
//! up by the [`JobExecutor`]. The job type selects the [`JobHandler`] that
//! executes it.
//!
//! Jobs follow a consistent pattern:
//! 1. A handler registered under the job type in [`JobHandlerRegistry`]
//! 2. The executor acquires due jobs and runs their handler
//! 3. The handler either finishes the job or hands back a rescheduled copy
//! 4. Every state change is written to the historic job log

mod executor;
mod worker;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
pub use executor::JobExecutor;
pub use worker::start_job_executor_worker;

use crate::{
    batch,
    engine::EngineContext,
    error::EngineResult,
    history_cleanup::HistoryCleanupHandler,
    models::{HistoricJobLog, Job, JobLogState, new_id},
};

/// Job types of the built-in handlers. Batch execution jobs use the batch
/// type as their job type.
pub mod job_types {
    pub const HISTORY_CLEANUP: &str = "history-cleanup";
    pub const BATCH_SEED: &str = "batch-seed-job";
    pub const BATCH_MONITOR: &str = "batch-monitor-job";
}

/// What the executor does with a job after its handler succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The job is finished and removed.
    Done,
    /// The job stays, persisted in the given state (new due date, counters).
    Rescheduled(Job),
}

/// Executes jobs of one type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn execute(&self, ctx: &EngineContext, job: &Job) -> EngineResult<JobOutcome>;
}

/// Handlers keyed by job type.
#[derive(Clone, Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// History cleanup plus the batch seed, monitor and execution handlers.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HistoryCleanupHandler));
        registry.register(Arc::new(batch::SeedJobHandler));
        registry.register(Arc::new(batch::MonitorJobHandler));
        for handler in batch::execution_handlers() {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler, replacing any handler of the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

/// Context copied onto every log entry written for a job.
#[derive(Debug, Clone, Default)]
pub(crate) struct JobLogContext {
    pub batch_id: Option<String>,
    pub job_definition_configuration: Option<String>,
}

impl JobLogContext {
    /// Jobs of a batch carry the batch id as their job definition configuration.
    pub(crate) async fn resolve(ctx: &EngineContext, job: &Job) -> EngineResult<Self> {
        let Some(definition_id) = job.job_definition_id.as_deref() else {
            return Ok(Self::default());
        };
        let configuration = ctx
            .db
            .jobs()
            .get_definition(definition_id)
            .await?
            .and_then(|definition| definition.job_configuration);
        Ok(Self {
            batch_id: configuration.clone(),
            job_definition_configuration: configuration,
        })
    }
}

pub(crate) async fn write_job_log(
    ctx: &EngineContext,
    job: &Job,
    state: JobLogState,
    log_context: &JobLogContext,
    exception_byte_array_id: Option<String>,
) -> EngineResult<()> {
    let log = HistoricJobLog {
        id: new_id(),
        job_id: job.id.clone(),
        job_type: job.job_type.clone(),
        job_definition_id: job.job_definition_id.clone(),
        job_definition_configuration: log_context.job_definition_configuration.clone(),
        deployment_id: job.deployment_id.clone(),
        process_instance_id: job.process_instance_id.clone(),
        root_process_instance_id: None,
        batch_id: log_context.batch_id.clone(),
        state,
        job_retries: Some(job.retries),
        exception_message: match state {
            JobLogState::Failed => job.exception_message.clone(),
            _ => None,
        },
        exception_byte_array_id,
        timestamp: ctx.now(),
        removal_time: None,
    };
    ctx.db.job_logs().insert(&log).await?;
    Ok(())
}

/// Persist a new job and log its creation.
pub(crate) async fn create_job(ctx: &EngineContext, job: &Job) -> EngineResult<()> {
    ctx.db.jobs().insert(job).await?;
    let log_context = JobLogContext::resolve(ctx, job).await?;
    write_job_log(ctx, job, JobLogState::Created, &log_context, None).await?;
    tracing::debug!(job_id = %job.id, job_type = %job.job_type, due_date = ?job.due_date, "Job created");
    Ok(())
}

/// Remove a job with its exception and incidents, and log the deletion.
pub(crate) async fn delete_job(ctx: &EngineContext, job: &Job) -> EngineResult<()> {
    let log_context = JobLogContext::resolve(ctx, job).await?;
    let jobs = ctx.db.jobs();
    jobs.delete(&job.id).await?;
    jobs.delete_incidents_for_job(&job.id).await?;
    if let Some(byte_array_id) = &job.exception_byte_array_id {
        ctx.db.byte_arrays().delete(byte_array_id).await?;
    }
    write_job_log(ctx, job, JobLogState::Deleted, &log_context, None).await?;
    Ok(())
}
