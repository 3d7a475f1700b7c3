use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Names of engine metrics written to the meter log.
pub mod metric_names {
    pub const HISTORY_CLEANUP_REMOVED_PROCESS_INSTANCES: &str =
        "history-cleanup-removed-process-instances";
    pub const HISTORY_CLEANUP_REMOVED_DECISION_INSTANCES: &str =
        "history-cleanup-removed-decision-instances";
    pub const HISTORY_CLEANUP_REMOVED_CASE_INSTANCES: &str =
        "history-cleanup-removed-case-instances";
    pub const HISTORY_CLEANUP_REMOVED_BATCH_OPERATIONS: &str =
        "history-cleanup-removed-batch-operations";
    pub const JOB_SUCCESSFUL: &str = "job-successful";
    pub const JOB_FAILED: &str = "job-failed";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterLogEntry {
    pub id: String,
    pub name: String,
    pub reporter: Option<String>,
    pub value: i64,
    pub timestamp: DateTime<Utc>,
}
