use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CleanupCriteria, DefinitionCounts};
use crate::{
    db::error::DbResult,
    models::{
        HistoricActivityInstance, HistoricIncident, HistoricProcessInstance,
        HistoricProcessInstanceQuery, HistoricTaskInstance, HistoricVariableInstance,
        ProcessInstanceState,
    },
};

/// Historic process instances and the rows recorded while they ran.
#[async_trait]
pub trait ProcessHistoryRepo: Send + Sync {
    async fn insert_process_instance(&self, instance: &HistoricProcessInstance) -> DbResult<()>;

    async fn get_process_instance(&self, id: &str) -> DbResult<Option<HistoricProcessInstance>>;

    async fn list_process_instances(
        &self,
        query: &HistoricProcessInstanceQuery,
    ) -> DbResult<Vec<HistoricProcessInstance>>;

    async fn count_process_instances(&self, query: &HistoricProcessInstanceQuery) -> DbResult<i64>;

    /// Set the end time and final state of a process instance.
    async fn end_process_instance(
        &self,
        id: &str,
        state: ProcessInstanceState,
        end_time: DateTime<Utc>,
    ) -> DbResult<()>;

    async fn insert_activity_instance(&self, activity: &HistoricActivityInstance) -> DbResult<()>;

    async fn list_activity_instances(
        &self,
        process_instance_id: &str,
    ) -> DbResult<Vec<HistoricActivityInstance>>;

    async fn insert_task_instance(&self, task: &HistoricTaskInstance) -> DbResult<()>;

    async fn list_task_instances(&self, process_instance_id: &str)
    -> DbResult<Vec<HistoricTaskInstance>>;

    async fn insert_variable(&self, variable: &HistoricVariableInstance) -> DbResult<()>;

    async fn list_variables(&self, process_instance_id: &str)
    -> DbResult<Vec<HistoricVariableInstance>>;

    async fn insert_incident(&self, incident: &HistoricIncident) -> DbResult<()>;

    /// Close the open historic incidents raised for a job.
    async fn end_incidents_for_configuration(
        &self,
        configuration: &str,
        end_time: DateTime<Utc>,
    ) -> DbResult<u64>;

    async fn list_incidents(&self, process_instance_id: &str) -> DbResult<Vec<HistoricIncident>>;

    /// Set the removal time of every row that belongs to a process tree.
    async fn set_removal_time_for_root(
        &self,
        root_process_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64>;

    /// Set the removal time of a single process instance and its own rows.
    async fn set_removal_time_for_instance(
        &self,
        process_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64>;

    /// Delete process instances with everything recorded for them, including
    /// decisions they evaluated. Returns the number of process instances deleted.
    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64>;

    /// Ids of finished process instances due for cleanup.
    async fn find_ids_for_cleanup(&self, criteria: &CleanupCriteria) -> DbResult<Vec<String>>;

    /// Finished and cleanable counts per process definition id.
    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<DefinitionCounts>>;
}
