use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CleanupCriteria, DefinitionCounts};
use crate::{
    db::error::DbResult,
    models::{CaseInstanceState, HistoricCaseInstance, HistoricCaseInstanceQuery},
};

#[async_trait]
pub trait CaseHistoryRepo: Send + Sync {
    async fn insert_case_instance(&self, instance: &HistoricCaseInstance) -> DbResult<()>;

    async fn get_case_instance(&self, id: &str) -> DbResult<Option<HistoricCaseInstance>>;

    async fn list_case_instances(
        &self,
        query: &HistoricCaseInstanceQuery,
    ) -> DbResult<Vec<HistoricCaseInstance>>;

    /// Move a case instance to a new state; `close_time` is set when closing.
    async fn update_state(
        &self,
        id: &str,
        state: CaseInstanceState,
        close_time: Option<DateTime<Utc>>,
    ) -> DbResult<()>;

    async fn set_removal_time(&self, id: &str, removal_time: Option<DateTime<Utc>>)
    -> DbResult<u64>;

    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64>;

    async fn find_ids_for_cleanup(&self, criteria: &CleanupCriteria) -> DbResult<Vec<String>>;

    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<DefinitionCounts>>;
}
