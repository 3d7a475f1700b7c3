use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CleanupCriteria;
use crate::{
    db::error::DbResult,
    models::{Batch, CleanableCounts, HistoricBatch},
};

/// Time-to-live of finished batches, in days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTimeToLive {
    /// Applies to batch types without their own entry.
    pub default_days: Option<i32>,
    pub by_type: BTreeMap<String, i32>,
}

impl BatchTimeToLive {
    pub fn for_type(&self, batch_type: &str) -> Option<i32> {
        self.by_type.get(batch_type).copied().or(self.default_days)
    }
}

#[async_trait]
pub trait BatchRepo: Send + Sync {
    async fn insert(&self, batch: &Batch) -> DbResult<()>;

    async fn get(&self, id: &str) -> DbResult<Option<Batch>>;

    /// Running batches, oldest first.
    async fn list(&self) -> DbResult<Vec<Batch>>;

    /// Persist job counters, suspension and execution start time. The
    /// execution start time is copied to the historic batch once.
    async fn update(&self, batch: &Batch) -> DbResult<()>;

    async fn delete(&self, id: &str) -> DbResult<()>;

    // ========================================================================
    // Historic batches
    // ========================================================================

    async fn insert_historic(&self, batch: &HistoricBatch) -> DbResult<()>;

    async fn get_historic(&self, id: &str) -> DbResult<Option<HistoricBatch>>;

    async fn list_historic(&self) -> DbResult<Vec<HistoricBatch>>;

    /// Record the end of a batch.
    async fn complete_historic(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<()>;

    /// Set the removal time of a historic batch and of the job logs,
    /// incidents, operation log entries and byte arrays written for it.
    async fn set_removal_time(&self, id: &str, removal_time: Option<DateTime<Utc>>)
    -> DbResult<u64>;

    /// Delete historic batches with everything written for them.
    async fn delete_historic_cascade(&self, ids: &[String]) -> DbResult<u64>;

    async fn find_ids_for_cleanup(
        &self,
        criteria: &CleanupCriteria,
        ttl: &BatchTimeToLive,
    ) -> DbResult<Vec<String>>;

    /// Finished and cleanable counts per batch type.
    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
        ttl: &BatchTimeToLive,
    ) -> DbResult<Vec<(String, CleanableCounts)>>;
}
