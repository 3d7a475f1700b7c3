use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{Incident, Job, JobDefinition, JobQuery},
};

#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn insert(&self, job: &Job) -> DbResult<()>;

    async fn get(&self, id: &str) -> DbResult<Option<Job>>;

    /// Persist the mutable fields of a job: configuration, due date,
    /// retries, exception and suspension state.
    async fn update(&self, job: &Job) -> DbResult<()>;

    async fn delete(&self, id: &str) -> DbResult<()>;

    /// Jobs matching the query, ordered by creation time.
    async fn list(&self, query: &JobQuery) -> DbResult<Vec<Job>>;

    async fn count(&self, query: &JobQuery) -> DbResult<i64>;

    /// Due, active jobs with retries left. Jobs without a due date come first.
    async fn find_acquirable(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<Job>>;

    async fn delete_by_definition(&self, job_definition_id: &str) -> DbResult<u64>;

    // ========================================================================
    // Job definitions
    // ========================================================================

    async fn insert_definition(&self, definition: &JobDefinition) -> DbResult<()>;

    async fn get_definition(&self, id: &str) -> DbResult<Option<JobDefinition>>;

    async fn set_definition_suspended(&self, id: &str, suspended: bool) -> DbResult<()>;

    async fn delete_definition(&self, id: &str) -> DbResult<()>;

    // ========================================================================
    // Incidents
    // ========================================================================

    async fn insert_incident(&self, incident: &Incident) -> DbResult<()>;

    /// Open incidents raised for a job.
    async fn list_incidents_for_job(&self, job_id: &str) -> DbResult<Vec<Incident>>;

    async fn delete_incidents_for_job(&self, job_id: &str) -> DbResult<u64>;
}
