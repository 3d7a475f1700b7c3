use chrono::{DateTime, Utc};

use crate::{
    authz::PermissionCheck,
    batch,
    engine::EngineContext,
    error::{EngineError, EngineResult, ensure_not_null},
    jobs::{JobExecutor, JobLogContext},
    models::{
        Authentication, Batch, BatchStatistics, CreateUserOperation, HistoricBatch,
        HistoricJobLog, Job, JobQuery, OperationCategory, Permission, PropertyChange, Resource,
        entity_types, operation_types,
    },
};

/// Job, batch and metric management on behalf of the caller.
pub struct ManagementService<'a> {
    ctx: &'a EngineContext,
    executor: &'a JobExecutor,
    auth: Option<&'a Authentication>,
}

impl<'a> ManagementService<'a> {
    pub fn new(
        ctx: &'a EngineContext,
        executor: &'a JobExecutor,
        auth: Option<&'a Authentication>,
    ) -> Self {
        Self {
            ctx,
            executor,
            auth,
        }
    }

    async fn find_job(&self, job_id: &str) -> EngineResult<Job> {
        self.ctx
            .db
            .jobs()
            .get(job_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("No job found with id '{}'", job_id)))
    }

    /// Jobs of a batch need `UPDATE` on the batch; every other job is
    /// reserved to admins.
    async fn check_update_job(&self, job: &Job) -> EngineResult<()> {
        match JobLogContext::resolve(self.ctx, job).await?.batch_id {
            Some(batch_id) => {
                self.ctx
                    .authz
                    .check(
                        self.auth,
                        PermissionCheck::new(Permission::Update, Resource::Batch, batch_id),
                    )
                    .await
            }
            None => self.ctx.authz.check_admin(self.auth),
        }
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    pub async fn get_job(&self, job_id: &str) -> EngineResult<Job> {
        self.ctx.authz.check_admin(self.auth)?;
        self.find_job(job_id).await
    }

    pub async fn list_jobs(&self, query: &JobQuery) -> EngineResult<Vec<Job>> {
        self.ctx.authz.check_admin(self.auth)?;
        Ok(self.ctx.db.jobs().list(query).await?)
    }

    /// Execute a job now, regardless of its due date.
    pub async fn execute_job(&self, job_id: Option<&str>) -> EngineResult<()> {
        let job_id = ensure_not_null(job_id.as_ref(), "jobId")?;
        let job = self.find_job(job_id).await?;
        self.check_update_job(&job).await?;
        self.executor.execute_job(&job.id).await
    }

    /// Set the retries of a job. Giving retries back to a job that had none
    /// resolves its incident.
    pub async fn set_job_retries(&self, job_id: &str, retries: i32) -> EngineResult<()> {
        if retries < 0 {
            return Err(EngineError::bad_request(format!(
                "The number of job retries must be a non-negative Integer, but '{}' has been provided.",
                retries
            )));
        }
        let mut job = self.find_job(job_id).await?;
        self.check_update_job(&job).await?;

        let previous = job.retries;
        job.retries = retries;
        self.ctx.db.jobs().update(&job).await?;

        if previous <= 0 && retries > 0 {
            self.ctx.db.jobs().delete_incidents_for_job(&job.id).await?;
            self.ctx
                .db
                .process_history()
                .end_incidents_for_configuration(&job.id, self.ctx.now())
                .await?;
        }

        self.ctx
            .log_operation(
                CreateUserOperation::new(
                    operation_types::SET_JOB_RETRIES,
                    entity_types::JOB,
                    OperationCategory::Operator,
                    self.auth.map(|a| a.user_id.clone()),
                )
                .with_job(&job.id)
                .with_change(PropertyChange::new(
                    "retries",
                    Some(previous.to_string()),
                    Some(retries.to_string()),
                )),
            )
            .await?;
        tracing::info!(job_id = %job.id, previous, retries, "Job retries set");
        Ok(())
    }

    /// The stack trace stored for the last failure of a job, if any.
    pub async fn get_job_exception_stacktrace(&self, job_id: &str) -> EngineResult<Option<String>> {
        let job = self.find_job(job_id).await?;
        self.check_update_job(&job).await?;
        let Some(byte_array_id) = job.exception_byte_array_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .ctx
            .db
            .byte_arrays()
            .get(byte_array_id)
            .await?
            .map(|byte_array| String::from_utf8_lossy(&byte_array.bytes).into_owned()))
    }

    /// The historic log of a job, oldest entry first.
    pub async fn job_log(&self, job_id: &str) -> EngineResult<Vec<HistoricJobLog>> {
        self.ctx.authz.check_admin(self.auth)?;
        Ok(self.ctx.db.job_logs().list_by_job(job_id).await?)
    }

    // ── Metrics ──────────────────────────────────────────────────────────

    /// Sum of a meter over `[start, end)`, or over all time.
    pub async fn metrics_sum(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EngineResult<i64> {
        self.ctx.authz.check_admin(self.auth)?;
        Ok(self.ctx.db.meter_logs().sum(name, start, end).await?)
    }

    // ── Batches ──────────────────────────────────────────────────────────

    pub async fn get_batch(&self, batch_id: &str) -> EngineResult<Batch> {
        batch::get_batch(self.ctx, self.auth, batch_id).await
    }

    pub async fn list_batches(&self) -> EngineResult<Vec<Batch>> {
        batch::list_batches(self.ctx, self.auth).await
    }

    pub async fn batch_statistics(&self, batch_id: &str) -> EngineResult<BatchStatistics> {
        batch::batch_statistics(self.ctx, self.auth, batch_id).await
    }

    pub async fn list_batch_statistics(&self) -> EngineResult<Vec<BatchStatistics>> {
        batch::list_batch_statistics(self.ctx, self.auth).await
    }

    pub async fn suspend_batch(&self, batch_id: &str) -> EngineResult<()> {
        batch::set_batch_suspended(self.ctx, self.auth, batch_id, true).await
    }

    pub async fn activate_batch(&self, batch_id: &str) -> EngineResult<()> {
        batch::set_batch_suspended(self.ctx, self.auth, batch_id, false).await
    }

    pub async fn delete_batch(&self, batch_id: &str, cascade: bool) -> EngineResult<()> {
        batch::delete_batch(self.ctx, self.auth, batch_id, cascade).await
    }

    pub async fn get_historic_batch(&self, batch_id: &str) -> EngineResult<HistoricBatch> {
        batch::get_historic_batch(self.ctx, self.auth, batch_id).await
    }

    pub async fn list_historic_batches(&self) -> EngineResult<Vec<HistoricBatch>> {
        batch::list_historic_batches(self.ctx, self.auth).await
    }
}
