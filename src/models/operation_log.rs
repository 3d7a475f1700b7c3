use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation types written to the user operation log.
pub mod operation_types {
    pub const CREATE_HISTORY_CLEANUP_JOBS: &str = "CreateHistoryCleanupJobs";
    pub const DELETE_HISTORY: &str = "DeleteHistory";
    pub const DELETE: &str = "Delete";
    pub const SET_REMOVAL_TIME: &str = "SetRemovalTime";
    pub const SET_JOB_RETRIES: &str = "SetJobRetries";
    pub const SUSPEND_BATCH: &str = "SuspendBatch";
    pub const ACTIVATE_BATCH: &str = "ActivateBatch";
    pub const UPDATE_HISTORY_TIME_TO_LIVE: &str = "UpdateHistoryTimeToLive";
}

/// Entity types written to the user operation log.
pub mod entity_types {
    pub const JOB: &str = "Job";
    pub const BATCH: &str = "Batch";
    pub const PROCESS_INSTANCE: &str = "ProcessInstance";
    pub const DECISION_INSTANCE: &str = "DecisionInstance";
    pub const DECISION_DEFINITION: &str = "DecisionDefinition";
    pub const PROCESS_DEFINITION: &str = "ProcessDefinition";
    pub const CASE_INSTANCE: &str = "CaseInstance";
    pub const CASE_DEFINITION: &str = "CaseDefinition";
}

/// Audience of an operation log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationCategory {
    Operator,
    Admin,
    TaskWorker,
}

impl OperationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCategory::Operator => "Operator",
            OperationCategory::Admin => "Admin",
            OperationCategory::TaskWorker => "TaskWorker",
        }
    }
}

impl std::str::FromStr for OperationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Operator" => Ok(OperationCategory::Operator),
            "Admin" => Ok(OperationCategory::Admin),
            "TaskWorker" => Ok(OperationCategory::TaskWorker),
            _ => Err(format!("Invalid operation category: {}", s)),
        }
    }
}

/// One property change recorded for a user operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOperationLogEntry {
    pub id: String,
    /// Shared by all entries written for the same operation.
    pub operation_id: String,
    pub operation_type: String,
    pub entity_type: String,
    pub category: OperationCategory,
    pub property: Option<String>,
    pub org_value: Option<String>,
    pub new_value: Option<String>,
    pub user_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub batch_id: Option<String>,
    pub job_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}

/// A property change to log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub org_value: Option<String>,
    pub new_value: Option<String>,
}

impl PropertyChange {
    pub fn new(property: impl Into<String>, org_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            property: property.into(),
            org_value,
            new_value,
        }
    }
}

/// Input for writing an operation to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserOperation {
    pub operation_type: String,
    pub entity_type: String,
    pub category: OperationCategory,
    pub user_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub batch_id: Option<String>,
    pub job_id: Option<String>,
    /// At least one entry is written; an empty list logs a bare operation.
    pub changes: Vec<PropertyChange>,
}

impl CreateUserOperation {
    pub fn new(
        operation_type: &str,
        entity_type: &str,
        category: OperationCategory,
        user_id: Option<String>,
    ) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            entity_type: entity_type.to_string(),
            category,
            user_id,
            process_instance_id: None,
            root_process_instance_id: None,
            batch_id: None,
            job_id: None,
            changes: Vec::new(),
        }
    }

    pub fn with_change(mut self, change: PropertyChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Filter for operation log queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserOperationLogQuery {
    pub operation_type: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<String>,
    pub batch_id: Option<String>,
    pub job_id: Option<String>,
}
