use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CleanupCriteria;
use crate::{db::error::DbResult, models::HistoricJobLog};

#[async_trait]
pub trait JobLogRepo: Send + Sync {
    async fn insert(&self, log: &HistoricJobLog) -> DbResult<()>;

    /// All log entries of a job, oldest first.
    async fn list_by_job(&self, job_id: &str) -> DbResult<Vec<HistoricJobLog>>;

    async fn list_by_job_type(&self, job_type: &str) -> DbResult<Vec<HistoricJobLog>>;

    /// Ids of log entries of `job_type` older than `cutoff`, partitioned by
    /// the minute of their timestamp.
    async fn find_ids_for_cleanup(
        &self,
        job_type: &str,
        cutoff: DateTime<Utc>,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<String>>;

    /// Delete log entries and their exception byte arrays.
    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64>;
}
