//! Engine context and service facade.
//!
//! [`EngineContext`] bundles everything job handlers and services share: the
//! database, the clock, the parsed configuration and the authorization
//! checker. [`Engine`] is the cheap-to-clone entry point handed to the HTTP
//! layer and the CLI.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    authz::AuthorizationChecker,
    clock::Clock,
    config::EngineConfig,
    db::{BatchTimeToLive, DbPool},
    error::EngineResult,
    history_cleanup::{self, BatchWindowManager},
    jobs::{JobExecutor, JobHandlerRegistry},
    models::{Authentication, CreateUserOperation, MeterLogEntry, new_id},
    observability::metrics,
    services::{HistoryRecorder, HistoryService, ManagementService, RepositoryService},
};

/// Shared state of a running engine.
pub struct EngineContext {
    pub db: Arc<DbPool>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
    pub authz: AuthorizationChecker,
    pub windows: BatchWindowManager,
    /// Global TTL for definitions deployed without one.
    pub default_ttl_days: Option<i32>,
    pub batch_ttl: BatchTimeToLive,
    /// TTL of the job logs written by history cleanup jobs.
    pub job_log_ttl_days: Option<i32>,
}

impl EngineContext {
    /// Validate the configuration and resolve its derived settings.
    pub fn new(config: EngineConfig, db: Arc<DbPool>, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        config.validate()?;

        let windows = BatchWindowManager::from_config(&config.history_cleanup)?;
        let default_ttl_days = config.history.default_ttl_days()?;
        let batch_ttl = BatchTimeToLive {
            default_days: config.history.batch_ttl_days()?,
            by_type: config.history.batch_ttl_days_by_type()?,
        };
        let job_log_ttl_days = config.history_cleanup.job_log_ttl_days()?;
        let authz = AuthorizationChecker::new(config.authorization.clone(), db.authorizations());

        Ok(Self {
            db,
            clock,
            config,
            authz,
            windows,
            default_ttl_days,
            batch_ttl,
            job_log_ttl_days,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Retries given to new jobs.
    pub fn default_retries(&self) -> i32 {
        self.config.job_executor.default_number_of_retries
    }

    /// Retries given to history cleanup jobs.
    pub fn cleanup_retries(&self) -> i32 {
        self.config
            .history_cleanup
            .default_number_of_retries
            .unwrap_or_else(|| self.default_retries())
    }

    /// Write a user operation to the log, stamped with the engine time.
    pub async fn log_operation(&self, operation: CreateUserOperation) -> EngineResult<()> {
        self.db.operation_log().create(operation, self.now()).await?;
        Ok(())
    }

    /// Count an engine metric. Persisted to the meter log when enabled so
    /// that it can be summed through the management service.
    pub async fn record_meter(&self, name: &str, value: i64) -> EngineResult<()> {
        metrics::record_meter(name, value);
        if !self.config.observability.metrics.persist || value == 0 {
            return Ok(());
        }
        let entry = MeterLogEntry {
            id: new_id(),
            name: name.to_string(),
            reporter: None,
            value,
            timestamp: self.now(),
        };
        self.db.meter_logs().insert(&entry).await?;
        Ok(())
    }
}

/// The engine: services plus the job executor, bound to an optional
/// authenticated user.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
    executor: Arc<JobExecutor>,
    auth: Option<Authentication>,
}

impl Engine {
    pub fn new(config: EngineConfig, db: Arc<DbPool>, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        let ctx = Arc::new(EngineContext::new(config, db, clock)?);
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&ctx),
            JobHandlerRegistry::with_builtin_handlers(),
        ));
        Ok(Self {
            ctx,
            executor,
            auth: None,
        })
    }

    /// A handle that performs every call as `auth`.
    pub fn with_authentication(&self, auth: Authentication) -> Self {
        Self {
            auth: Some(auth),
            ..self.clone()
        }
    }

    pub fn authentication(&self) -> Option<&Authentication> {
        self.auth.as_ref()
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn history(&self) -> HistoryService<'_> {
        HistoryService::new(&self.ctx, self.auth.as_ref())
    }

    pub fn management(&self) -> ManagementService<'_> {
        ManagementService::new(&self.ctx, &self.executor, self.auth.as_ref())
    }

    pub fn repository(&self) -> RepositoryService<'_> {
        RepositoryService::new(&self.ctx, self.auth.as_ref())
    }

    /// Records the history that process, decision and case executions leave behind.
    pub fn recorder(&self) -> HistoryRecorder<'_> {
        HistoryRecorder::new(&self.ctx)
    }

    /// Bring the history cleanup jobs in line with the configured windows.
    pub async fn bootstrap(&self) -> EngineResult<()> {
        history_cleanup::bootstrap(&self.ctx).await
    }
}
