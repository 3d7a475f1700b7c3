mod error;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, feature = "database-sqlite"))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    definitions: Arc<dyn DefinitionRepo>,
    process_history: Arc<dyn ProcessHistoryRepo>,
    decision_history: Arc<dyn DecisionHistoryRepo>,
    case_history: Arc<dyn CaseHistoryRepo>,
    job_logs: Arc<dyn JobLogRepo>,
    operation_log: Arc<dyn OperationLogRepo>,
    byte_arrays: Arc<dyn ByteArrayRepo>,
    jobs: Arc<dyn JobRepo>,
    batches: Arc<dyn BatchRepo>,
    meter_logs: Arc<dyn MeterLogRepo>,
    authorizations: Arc<dyn AuthorizationRepo>,
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(not(feature = "database-sqlite"))]
    _None(std::convert::Infallible),
}

/// Database pool with its repositories.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            definitions: Arc::new(sqlite::SqliteDefinitionRepo::new(pool.clone())),
            process_history: Arc::new(sqlite::SqliteProcessHistoryRepo::new(pool.clone())),
            decision_history: Arc::new(sqlite::SqliteDecisionHistoryRepo::new(pool.clone())),
            case_history: Arc::new(sqlite::SqliteCaseHistoryRepo::new(pool.clone())),
            job_logs: Arc::new(sqlite::SqliteJobLogRepo::new(pool.clone())),
            operation_log: Arc::new(sqlite::SqliteOperationLogRepo::new(pool.clone())),
            byte_arrays: Arc::new(sqlite::SqliteByteArrayRepo::new(pool.clone())),
            jobs: Arc::new(sqlite::SqliteJobRepo::new(pool.clone())),
            batches: Arc::new(sqlite::SqliteBatchRepo::new(pool.clone())),
            meter_logs: Arc::new(sqlite::SqliteMeterLogRepo::new(pool.clone())),
            authorizations: Arc::new(sqlite::SqliteAuthorizationRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                Ok(Self::from_sqlite(pool))
            }
        }
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(not(feature = "database-sqlite"))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get definition repository
    pub fn definitions(&self) -> Arc<dyn DefinitionRepo> {
        Arc::clone(&self.repos.definitions)
    }

    /// Get historic process instance repository
    pub fn process_history(&self) -> Arc<dyn ProcessHistoryRepo> {
        Arc::clone(&self.repos.process_history)
    }

    /// Get historic decision instance repository
    pub fn decision_history(&self) -> Arc<dyn DecisionHistoryRepo> {
        Arc::clone(&self.repos.decision_history)
    }

    /// Get historic case instance repository
    pub fn case_history(&self) -> Arc<dyn CaseHistoryRepo> {
        Arc::clone(&self.repos.case_history)
    }

    /// Get historic job log repository
    pub fn job_logs(&self) -> Arc<dyn JobLogRepo> {
        Arc::clone(&self.repos.job_logs)
    }

    /// Get user operation log repository
    pub fn operation_log(&self) -> Arc<dyn OperationLogRepo> {
        Arc::clone(&self.repos.operation_log)
    }

    /// Get byte array repository
    pub fn byte_arrays(&self) -> Arc<dyn ByteArrayRepo> {
        Arc::clone(&self.repos.byte_arrays)
    }

    /// Get job repository
    pub fn jobs(&self) -> Arc<dyn JobRepo> {
        Arc::clone(&self.repos.jobs)
    }

    /// Get batch repository
    pub fn batches(&self) -> Arc<dyn BatchRepo> {
        Arc::clone(&self.repos.batches)
    }

    /// Get meter log repository
    pub fn meter_logs(&self) -> Arc<dyn MeterLogRepo> {
        Arc::clone(&self.repos.meter_logs)
    }

    /// Get authorization repository
    pub fn authorizations(&self) -> Arc<dyn AuthorizationRepo> {
        Arc::clone(&self.repos.authorizations)
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(not(feature = "database-sqlite"))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
