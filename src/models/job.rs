use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of asynchronous work executed by the job executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Selects the handler that executes the job.
    pub job_type: String,
    /// Handler specific configuration, usually JSON or an entity id.
    pub handler_configuration: Option<String>,
    pub job_definition_id: Option<String>,
    pub deployment_id: Option<String>,
    pub process_instance_id: Option<String>,
    /// `None` means due immediately.
    pub due_date: Option<DateTime<Utc>>,
    pub retries: i32,
    pub exception_message: Option<String>,
    pub exception_byte_array_id: Option<String>,
    pub suspended: bool,
    pub priority: i64,
    pub create_time: DateTime<Utc>,
}

impl Job {
    /// Build a new job with no definition, deployment or exception.
    pub fn new(id: String, job_type: impl Into<String>, retries: i32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            handler_configuration: None,
            job_definition_id: None,
            deployment_id: None,
            process_instance_id: None,
            due_date: None,
            retries,
            exception_message: None,
            exception_byte_array_id: None,
            suspended: false,
            priority: 0,
            create_time: now,
        }
    }
}

/// Shared settings of all jobs of one kind, e.g. the seed jobs of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub job_type: String,
    pub job_configuration: Option<String>,
    pub suspended: bool,
}

/// A runtime incident raised when a job runs out of retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub incident_type: String,
    pub message: Option<String>,
    /// Id of the failed job.
    pub configuration: String,
    pub job_definition_id: Option<String>,
    pub process_instance_id: Option<String>,
    pub create_time: DateTime<Utc>,
}

/// Incident type raised for jobs without retries.
pub const FAILED_JOB_INCIDENT: &str = "failedJob";

/// Filter for job queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobQuery {
    pub ids: Option<Vec<String>>,
    pub job_type: Option<String>,
    pub job_definition_id: Option<String>,
    pub suspended: Option<bool>,
    /// Only jobs that have an exception message.
    pub with_exception: bool,
    /// Only jobs with no retries left.
    pub no_retries_left: bool,
}

impl JobQuery {
    pub fn by_type(job_type: impl Into<String>) -> Self {
        Self {
            job_type: Some(job_type.into()),
            ..Default::default()
        }
    }

    pub fn by_definition(job_definition_id: impl Into<String>) -> Self {
        Self {
            job_definition_id: Some(job_definition_id.into()),
            ..Default::default()
        }
    }
}
