use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Background job executor configuration.
///
/// ```toml
/// [job_executor]
/// enabled = true
/// default_number_of_retries = 3
/// max_jobs_per_acquisition = 10
/// wait_time_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobExecutorConfig {
    /// Run the acquisition loop in `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retries given to new jobs.
    #[serde(default = "default_number_of_retries")]
    pub default_number_of_retries: i32,

    /// Jobs fetched per acquisition cycle.
    #[serde(default = "default_max_jobs_per_acquisition")]
    pub max_jobs_per_acquisition: u32,

    /// Idle wait between acquisition cycles that found nothing.
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_number_of_retries: default_number_of_retries(),
            max_jobs_per_acquisition: default_max_jobs_per_acquisition(),
            wait_time_ms: default_wait_time_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_number_of_retries() -> i32 {
    3
}

fn default_max_jobs_per_acquisition() -> u32 {
    10
}

fn default_wait_time_ms() -> u64 {
    5000
}

impl JobExecutorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_number_of_retries < 0 {
            return Err(ConfigError::Validation(
                "job_executor.default_number_of_retries must not be negative".into(),
            ));
        }
        if self.max_jobs_per_acquisition == 0 {
            return Err(ConfigError::Validation(
                "job_executor.max_jobs_per_acquisition must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }
}
