//! Batch framework configuration.
//!
//! # Example
//!
//! ```toml
//! [batch]
//! jobs_per_seed = 100
//! invocations_per_batch_job = 1
//! poll_time_secs = 30
//!
//! [batch.invocations_per_batch_job_by_type]
//! historic-decision-instance-deletion = 10
//! ```

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Execution jobs created per seed job run.
    /// Default: 100
    #[serde(default = "default_jobs_per_seed")]
    pub jobs_per_seed: u32,

    /// Ids handled by a single execution job.
    /// Default: 1
    #[serde(default = "default_invocations_per_batch_job")]
    pub invocations_per_batch_job: u32,

    /// Per batch type overrides of `invocations_per_batch_job`.
    #[serde(default)]
    pub invocations_per_batch_job_by_type: BTreeMap<String, u32>,

    /// Seconds between monitor job runs.
    /// Default: 30
    #[serde(default = "default_poll_time_secs")]
    pub poll_time_secs: u64,

    /// Give new batch jobs a due date of "now" instead of none.
    #[serde(default)]
    pub ensure_job_due_date_not_null: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs_per_seed: default_jobs_per_seed(),
            invocations_per_batch_job: default_invocations_per_batch_job(),
            invocations_per_batch_job_by_type: BTreeMap::new(),
            poll_time_secs: default_poll_time_secs(),
            ensure_job_due_date_not_null: false,
        }
    }
}

fn default_jobs_per_seed() -> u32 {
    100
}

fn default_invocations_per_batch_job() -> u32 {
    1
}

fn default_poll_time_secs() -> u64 {
    30
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs_per_seed == 0 {
            return Err(ConfigError::Validation(
                "batch.jobs_per_seed must be at least 1".into(),
            ));
        }
        if self.invocations_per_batch_job == 0 {
            return Err(ConfigError::Validation(
                "batch.invocations_per_batch_job must be at least 1".into(),
            ));
        }
        if let Some((batch_type, _)) = self
            .invocations_per_batch_job_by_type
            .iter()
            .find(|(_, n)| **n == 0)
        {
            return Err(ConfigError::Validation(format!(
                "batch.invocations_per_batch_job_by_type.{} must be at least 1",
                batch_type
            )));
        }
        Ok(())
    }

    /// Invocations per job for a batch type, honoring per-type overrides.
    pub fn invocations_for(&self, batch_type: &str) -> u32 {
        self.invocations_per_batch_job_by_type
            .get(batch_type)
            .copied()
            .unwrap_or(self.invocations_per_batch_job)
    }

    pub fn poll_time(&self) -> Duration {
        Duration::from_secs(self.poll_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.jobs_per_seed, 100);
        assert_eq!(config.invocations_per_batch_job, 1);
        assert_eq!(config.poll_time(), Duration::from_secs(30));
        assert!(!config.ensure_job_due_date_not_null);
    }

    #[test]
    fn test_invocations_override() {
        let toml = r#"
            invocations_per_batch_job = 2

            [invocations_per_batch_job_by_type]
            historic-decision-instance-deletion = 10
        "#;
        let config: BatchConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.invocations_for("historic-decision-instance-deletion"), 10);
        assert_eq!(config.invocations_for("process-set-removal-time"), 2);
    }

    #[test]
    fn test_zero_invocations_rejected() {
        let config = BatchConfig {
            invocations_per_batch_job: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
