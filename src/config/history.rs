//! History time-to-live and removal time configuration.
//!
//! # Example
//!
//! ```toml
//! [history]
//! history_time_to_live = "P30D"
//! removal_time_strategy = "end"
//! batch_operation_history_time_to_live = "P5D"
//!
//! [history.batch_operations_for_history_cleanup]
//! historic-process-instance-deletion = "1"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// History configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// TTL assigned to deployed definitions that do not declare their own
    /// (`"5"` days or `"P5D"`).
    #[serde(default)]
    pub history_time_to_live: Option<String>,

    /// When removal times are assigned to historic data.
    #[serde(default)]
    pub removal_time_strategy: RemovalTimeStrategy,

    /// TTL of finished historic batches.
    #[serde(default)]
    pub batch_operation_history_time_to_live: Option<String>,

    /// TTL overrides per batch type.
    #[serde(default)]
    pub batch_operations_for_history_cleanup: BTreeMap<String, String>,
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_ttl_days()?;
        self.batch_ttl_days()?;
        self.batch_ttl_days_by_type()?;
        Ok(())
    }

    pub fn default_ttl_days(&self) -> Result<Option<i32>, ConfigError> {
        parse_optional("history.history_time_to_live", self.history_time_to_live.as_deref())
    }

    pub fn batch_ttl_days(&self) -> Result<Option<i32>, ConfigError> {
        parse_optional(
            "history.batch_operation_history_time_to_live",
            self.batch_operation_history_time_to_live.as_deref(),
        )
    }

    pub fn batch_ttl_days_by_type(&self) -> Result<BTreeMap<String, i32>, ConfigError> {
        self.batch_operations_for_history_cleanup
            .iter()
            .map(|(batch_type, raw)| {
                let field = format!("history.batch_operations_for_history_cleanup.{}", batch_type);
                parse_time_to_live(raw)
                    .map(|days| (batch_type.clone(), days))
                    .map_err(|reason| {
                        ConfigError::Validation(format!(
                            "Invalid value for {}: '{}' ({})",
                            field, raw, reason
                        ))
                    })
            })
            .collect()
    }
}

fn parse_optional(field: &str, raw: Option<&str>) -> Result<Option<i32>, ConfigError> {
    raw.map(|raw| {
        parse_time_to_live(raw).map_err(|reason| {
            ConfigError::Validation(format!(
                "Invalid value for {}: '{}' ({})",
                field, raw, reason
            ))
        })
    })
    .transpose()
}

/// When the removal time of historic data is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalTimeStrategy {
    /// At instance start: start time + TTL.
    Start,
    /// At instance end: end time + TTL.
    #[default]
    End,
    /// Never assign removal times.
    None,
}

/// Parse a time-to-live in days, written either as a plain number (`"5"`)
/// or an ISO-8601 day period (`"P5D"`).
pub fn parse_time_to_live(raw: &str) -> Result<i32, String> {
    let trimmed = raw.trim();
    let days = match trimmed.strip_prefix('P').or_else(|| trimmed.strip_prefix('p')) {
        Some(period) => {
            let digits = period
                .strip_suffix('D')
                .or_else(|| period.strip_suffix('d'))
                .ok_or_else(|| "only day periods like P5D are supported".to_string())?;
            if digits.is_empty() {
                return Err("period has no day count".to_string());
            }
            digits
                .parse::<i32>()
                .map_err(|_| "day count is not a number".to_string())?
        }
        None => trimmed
            .parse::<i32>()
            .map_err(|_| "expected a number of days or a period like P5D".to_string())?,
    };

    if days < 0 {
        return Err("must not be negative".to_string());
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("5", Ok(5))]
    #[case("0", Ok(0))]
    #[case("P6D", Ok(6))]
    #[case(" P30D ", Ok(30))]
    fn test_parse_valid_ttl(#[case] raw: &str, #[case] expected: Result<i32, ()>) {
        assert_eq!(parse_time_to_live(raw).map_err(|_| ()), expected);
    }

    #[rstest]
    #[case("PD")]
    #[case("P-1D")]
    #[case("-6")]
    #[case("P5W")]
    #[case("invalidValue")]
    #[case("")]
    fn test_parse_invalid_ttl(#[case] raw: &str) {
        assert!(parse_time_to_live(raw).is_err());
    }

    #[test]
    fn test_invalid_batch_ttl_names_the_field() {
        let config = HistoryConfig {
            batch_operation_history_time_to_live: Some("PD".into()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Invalid value"));
        assert!(err.contains("history.batch_operation_history_time_to_live"));
    }

    #[test]
    fn test_invalid_per_type_ttl_names_the_type() {
        let mut config = HistoryConfig::default();
        config
            .batch_operations_for_history_cleanup
            .insert("historic-process-instance-deletion".into(), "-1".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("historic-process-instance-deletion"), "{}", err);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            history_time_to_live = "5"
            removal_time_strategy = "start"
            batch_operation_history_time_to_live = "P1D"

            [batch_operations_for_history_cleanup]
            historic-decision-instance-deletion = "P3D"
        "#;
        let config: HistoryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_ttl_days().unwrap(), Some(5));
        assert_eq!(config.removal_time_strategy, RemovalTimeStrategy::Start);
        assert_eq!(config.batch_ttl_days().unwrap(), Some(1));
        assert_eq!(
            config.batch_ttl_days_by_type().unwrap()["historic-decision-instance-deletion"],
            3
        );
    }
}
