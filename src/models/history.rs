use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle state of a historic process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessInstanceState {
    Active,
    Suspended,
    Completed,
    ExternallyTerminated,
    InternallyTerminated,
}

impl ProcessInstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessInstanceState::Active => "active",
            ProcessInstanceState::Suspended => "suspended",
            ProcessInstanceState::Completed => "completed",
            ProcessInstanceState::ExternallyTerminated => "externally_terminated",
            ProcessInstanceState::InternallyTerminated => "internally_terminated",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(
            self,
            ProcessInstanceState::Active | ProcessInstanceState::Suspended
        )
    }
}

impl std::str::FromStr for ProcessInstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProcessInstanceState::Active),
            "suspended" => Ok(ProcessInstanceState::Suspended),
            "completed" => Ok(ProcessInstanceState::Completed),
            "externally_terminated" => Ok(ProcessInstanceState::ExternallyTerminated),
            "internally_terminated" => Ok(ProcessInstanceState::InternallyTerminated),
            _ => Err(format!("Invalid process instance state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricProcessInstance {
    pub id: String,
    pub process_definition_id: String,
    pub process_definition_key: String,
    pub deployment_id: Option<String>,
    pub business_key: Option<String>,
    /// Top-most instance of the call hierarchy; equals `id` for roots.
    pub root_process_instance_id: String,
    pub super_process_instance_id: Option<String>,
    pub state: ProcessInstanceState,
    pub start_user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricActivityInstance {
    pub id: String,
    pub process_instance_id: String,
    pub root_process_instance_id: String,
    pub activity_id: String,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricTaskInstance {
    pub id: String,
    pub process_instance_id: String,
    pub root_process_instance_id: String,
    pub name: Option<String>,
    pub assignee: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricVariableInstance {
    pub id: String,
    pub process_instance_id: String,
    pub root_process_instance_id: String,
    pub name: String,
    /// Inline JSON value; `None` when the value lives in a byte array.
    pub value: Option<JsonValue>,
    pub byte_array_id: Option<String>,
    pub create_time: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricIncident {
    pub id: String,
    pub incident_type: String,
    pub message: Option<String>,
    pub configuration: Option<String>,
    pub job_definition_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub batch_id: Option<String>,
    pub create_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

/// Kind of job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLogState {
    Created,
    Failed,
    Successful,
    Deleted,
}

impl JobLogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLogState::Created => "created",
            JobLogState::Failed => "failed",
            JobLogState::Successful => "successful",
            JobLogState::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for JobLogState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobLogState::Created),
            "failed" => Ok(JobLogState::Failed),
            "successful" => Ok(JobLogState::Successful),
            "deleted" => Ok(JobLogState::Deleted),
            _ => Err(format!("Invalid job log state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricJobLog {
    pub id: String,
    pub job_id: String,
    pub job_type: String,
    pub job_definition_id: Option<String>,
    pub job_definition_configuration: Option<String>,
    pub deployment_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub batch_id: Option<String>,
    pub state: JobLogState,
    pub job_retries: Option<i32>,
    pub exception_message: Option<String>,
    pub exception_byte_array_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricDecisionInstance {
    pub id: String,
    pub decision_definition_id: String,
    pub decision_definition_key: String,
    /// Set when the decision was evaluated by a process.
    pub process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    /// First decision of a decision requirements graph evaluation.
    pub root_decision_instance_id: Option<String>,
    pub evaluation_time: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionValueDirection {
    Input,
    Output,
}

impl DecisionValueDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionValueDirection::Input => "input",
            DecisionValueDirection::Output => "output",
        }
    }
}

impl std::str::FromStr for DecisionValueDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(DecisionValueDirection::Input),
            "output" => Ok(DecisionValueDirection::Output),
            _ => Err(format!("Invalid decision value direction: {}", s)),
        }
    }
}

/// An input or output value recorded with a decision evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricDecisionValue {
    pub id: String,
    pub decision_instance_id: String,
    pub direction: DecisionValueDirection,
    pub clause_id: String,
    pub value: Option<JsonValue>,
    pub byte_array_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseInstanceState {
    Active,
    Completed,
    Terminated,
    Closed,
}

impl CaseInstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseInstanceState::Active => "active",
            CaseInstanceState::Completed => "completed",
            CaseInstanceState::Terminated => "terminated",
            CaseInstanceState::Closed => "closed",
        }
    }
}

impl std::str::FromStr for CaseInstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CaseInstanceState::Active),
            "completed" => Ok(CaseInstanceState::Completed),
            "terminated" => Ok(CaseInstanceState::Terminated),
            "closed" => Ok(CaseInstanceState::Closed),
            _ => Err(format!("Invalid case instance state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricCaseInstance {
    pub id: String,
    pub case_definition_id: String,
    pub case_definition_key: String,
    pub state: CaseInstanceState,
    pub create_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub removal_time: Option<DateTime<Utc>>,
}

/// What a byte array holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteArrayType {
    Variable,
    JobException,
    Batch,
    DecisionValue,
}

impl ByteArrayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteArrayType::Variable => "variable",
            ByteArrayType::JobException => "job_exception",
            ByteArrayType::Batch => "batch",
            ByteArrayType::DecisionValue => "decision_value",
        }
    }
}

impl std::str::FromStr for ByteArrayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variable" => Ok(ByteArrayType::Variable),
            "job_exception" => Ok(ByteArrayType::JobException),
            "batch" => Ok(ByteArrayType::Batch),
            "decision_value" => Ok(ByteArrayType::DecisionValue),
            _ => Err(format!("Invalid byte array type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByteArray {
    pub id: String,
    pub name: Option<String>,
    pub bytes: Vec<u8>,
    pub byte_array_type: ByteArrayType,
    pub root_process_instance_id: Option<String>,
    pub batch_id: Option<String>,
    pub create_time: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}

/// Filter for historic process instance queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricProcessInstanceQuery {
    pub ids: Option<Vec<String>>,
    pub process_definition_id: Option<String>,
    pub process_definition_key: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub finished: Option<bool>,
    pub limit: Option<i64>,
}

impl HistoricProcessInstanceQuery {
    pub fn by_definition_key(key: impl Into<String>) -> Self {
        Self {
            process_definition_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn by_root(root_id: impl Into<String>) -> Self {
        Self {
            root_process_instance_id: Some(root_id.into()),
            ..Default::default()
        }
    }
}

/// Filter for historic decision instance queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricDecisionInstanceQuery {
    pub ids: Option<Vec<String>>,
    pub decision_definition_id: Option<String>,
    pub decision_definition_key: Option<String>,
    pub root_decision_instance_id: Option<String>,
    pub process_instance_id: Option<String>,
    /// Only the first decision of each evaluation.
    pub roots_only: bool,
    pub limit: Option<i64>,
}

impl HistoricDecisionInstanceQuery {
    pub fn by_definition_key(key: impl Into<String>) -> Self {
        Self {
            decision_definition_key: Some(key.into()),
            ..Default::default()
        }
    }
}

/// Filter for historic case instance queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricCaseInstanceQuery {
    pub ids: Option<Vec<String>>,
    pub case_definition_id: Option<String>,
    pub case_definition_key: Option<String>,
    pub closed: Option<bool>,
    pub limit: Option<i64>,
}
