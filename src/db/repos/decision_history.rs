use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CleanupCriteria, DefinitionCounts};
use crate::{
    db::error::DbResult,
    models::{HistoricDecisionInstance, HistoricDecisionInstanceQuery, HistoricDecisionValue},
};

#[async_trait]
pub trait DecisionHistoryRepo: Send + Sync {
    async fn insert_decision_instance(&self, instance: &HistoricDecisionInstance) -> DbResult<()>;

    async fn insert_decision_value(&self, value: &HistoricDecisionValue) -> DbResult<()>;

    async fn get_decision_instance(&self, id: &str) -> DbResult<Option<HistoricDecisionInstance>>;

    async fn list_decision_instances(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> DbResult<Vec<HistoricDecisionInstance>>;

    async fn count_decision_instances(&self, query: &HistoricDecisionInstanceQuery)
    -> DbResult<i64>;

    async fn list_decision_values(
        &self,
        decision_instance_id: &str,
    ) -> DbResult<Vec<HistoricDecisionValue>>;

    /// Set the removal time of a decision evaluation: the root decision
    /// instance, the decisions it required, their values and byte arrays.
    async fn set_removal_time_for_root(
        &self,
        root_decision_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64>;

    /// Set the removal time of one decision instance and its values.
    async fn set_removal_time_for_instance(
        &self,
        decision_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64>;

    /// Delete decision instances, the decisions evaluated under them and all
    /// their values. Returns the number of instances deleted.
    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64>;

    /// Ids of root decision instances due for cleanup.
    async fn find_ids_for_cleanup(&self, criteria: &CleanupCriteria) -> DbResult<Vec<String>>;

    /// Evaluated and cleanable counts per decision definition id.
    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<DefinitionCounts>>;
}
