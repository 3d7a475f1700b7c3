use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Built-in batch types.
pub mod batch_types {
    pub const HISTORIC_PROCESS_INSTANCE_DELETION: &str = "historic-process-instance-deletion";
    pub const HISTORIC_DECISION_INSTANCE_DELETION: &str = "historic-decision-instance-deletion";
    pub const HISTORIC_CASE_INSTANCE_DELETION: &str = "historic-case-instance-deletion";
    pub const PROCESS_SET_REMOVAL_TIME: &str = "process-set-removal-time";
    pub const DECISION_SET_REMOVAL_TIME: &str = "decision-set-removal-time";
    pub const BATCH_SET_REMOVAL_TIME: &str = "batch-set-removal-time";
}

/// A running bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub batch_type: String,
    /// Number of execution jobs the batch will create in total.
    pub total_jobs: i64,
    pub jobs_created: i64,
    pub batch_jobs_per_seed: i64,
    pub invocations_per_batch_job: i64,
    pub seed_job_definition_id: Option<String>,
    pub monitor_job_definition_id: Option<String>,
    pub batch_job_definition_id: Option<String>,
    /// Byte array holding the serialized batch configuration.
    pub configuration_byte_array_id: Option<String>,
    pub create_user_id: Option<String>,
    pub suspended: bool,
    pub start_time: DateTime<Utc>,
    /// Set when the first execution job runs.
    pub execution_start_time: Option<DateTime<Utc>>,
}

/// The persisted history of a batch, kept after the batch completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricBatch {
    pub id: String,
    pub batch_type: String,
    pub total_jobs: i64,
    pub batch_jobs_per_seed: i64,
    pub invocations_per_batch_job: i64,
    pub seed_job_definition_id: Option<String>,
    pub monitor_job_definition_id: Option<String>,
    pub batch_job_definition_id: Option<String>,
    pub create_user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub execution_start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

impl HistoricBatch {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            id: batch.id.clone(),
            batch_type: batch.batch_type.clone(),
            total_jobs: batch.total_jobs,
            batch_jobs_per_seed: batch.batch_jobs_per_seed,
            invocations_per_batch_job: batch.invocations_per_batch_job,
            seed_job_definition_id: batch.seed_job_definition_id.clone(),
            monitor_job_definition_id: batch.monitor_job_definition_id.clone(),
            batch_job_definition_id: batch.batch_job_definition_id.clone(),
            create_user_id: batch.create_user_id.clone(),
            start_time: batch.start_time,
            execution_start_time: batch.execution_start_time,
            end_time: None,
            removal_time: None,
        }
    }
}

/// Job counts of a running batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub batch: Batch,
    /// Execution jobs not yet created plus those still pending.
    pub remaining_jobs: i64,
    pub completed_jobs: i64,
    /// Execution jobs with no retries left.
    pub failed_jobs: i64,
}
