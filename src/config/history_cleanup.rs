//! History cleanup configuration.
//!
//! Configures the recurring cleanup jobs that purge historic data whose
//! time-to-live or removal time has elapsed.
//!
//! # Example
//!
//! ```toml
//! [history_cleanup]
//! enabled = true
//! strategy = "removal_time_based"
//! batch_window_start_time = "23:00"
//! batch_window_end_time = "01:00"
//! batch_size = 500
//! batch_threshold = 10
//! degree_of_parallelism = 4
//!
//! # Saturday gets a longer window
//! [history_cleanup.weekdays.saturday]
//! start_time = "20:00"
//! end_time = "06:00"
//! ```
//!
//! Window times are `HH:mm` with an optional UTC offset (`23:00+0200`).
//! Times without an offset are UTC.

use chrono::{Duration, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::{ConfigError, history::parse_time_to_live};

/// Largest accepted cleanup batch size.
pub const MAX_BATCH_SIZE: i64 = 500;

/// Largest accepted number of parallel cleanup jobs.
pub const MAX_DEGREE_OF_PARALLELISM: i64 = 8;

/// History cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryCleanupConfig {
    /// Whether history cleanup may be scheduled at all.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Which timestamp decides that historic data is due for removal.
    #[serde(default)]
    pub strategy: CleanupStrategy,

    /// Daily batch window start (`HH:mm[+HHMM]`).
    #[serde(default)]
    pub batch_window_start_time: Option<String>,

    /// Daily batch window end. Defaults to the start time (a 24 hour window).
    #[serde(default)]
    pub batch_window_end_time: Option<String>,

    /// Per-weekday windows that replace the daily window on that day.
    #[serde(default)]
    pub weekdays: WeekdayWindows,

    /// Maximum number of instances of one type removed per job run.
    /// Default: 500, range 1..=500
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// If fewer instances than this were removed, the job backs off.
    /// Default: 10
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: i64,

    /// Number of cleanup jobs sharing the minute range of an hour.
    /// Default: 1, range 1..=8
    #[serde(default = "default_degree_of_parallelism")]
    pub degree_of_parallelism: i64,

    /// Retries for cleanup jobs. Falls back to the job executor default.
    #[serde(default)]
    pub default_number_of_retries: Option<i32>,

    /// Time-to-live for the job log of the cleanup jobs themselves
    /// (`"5"` or `"P5D"`). Unset keeps the job log forever.
    #[serde(default)]
    pub job_log_time_to_live: Option<String>,
}

impl Default for HistoryCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CleanupStrategy::default(),
            batch_window_start_time: None,
            batch_window_end_time: None,
            weekdays: WeekdayWindows::default(),
            batch_size: default_batch_size(),
            batch_threshold: default_batch_threshold(),
            degree_of_parallelism: default_degree_of_parallelism(),
            default_number_of_retries: None,
            job_log_time_to_live: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> i64 {
    500
}

fn default_batch_threshold() -> i64 {
    10
}

fn default_degree_of_parallelism() -> i64 {
    1
}

impl HistoryCleanupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(invalid(
                "history_cleanup.batch_size",
                &self.batch_size.to_string(),
                &format!("must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }

        if self.batch_threshold < 0 {
            return Err(invalid(
                "history_cleanup.batch_threshold",
                &self.batch_threshold.to_string(),
                "must not be negative",
            ));
        }

        if !(1..=MAX_DEGREE_OF_PARALLELISM).contains(&self.degree_of_parallelism) {
            return Err(invalid(
                "history_cleanup.degree_of_parallelism",
                &self.degree_of_parallelism.to_string(),
                &format!("must be between 1 and {}", MAX_DEGREE_OF_PARALLELISM),
            ));
        }

        if let Some(retries) = self.default_number_of_retries
            && retries < 0
        {
            return Err(invalid(
                "history_cleanup.default_number_of_retries",
                &retries.to_string(),
                "must not be negative",
            ));
        }

        if let Some(ttl) = &self.job_log_time_to_live {
            parse_time_to_live(ttl)
                .map_err(|e| invalid("history_cleanup.job_log_time_to_live", ttl, &e))?;
        }

        self.daily_window()?;
        for (day, window) in self.weekdays.iter() {
            window.resolve(&format!("history_cleanup.weekdays.{}", weekday_name(day)))?;
        }

        Ok(())
    }

    /// Parse the daily window. `None` if no start time is configured.
    pub fn daily_window(&self) -> Result<Option<WindowTimes>, ConfigError> {
        BatchWindowTimes {
            start_time: self.batch_window_start_time.clone(),
            end_time: self.batch_window_end_time.clone(),
        }
        .resolve_fields(
            "history_cleanup.batch_window_start_time",
            "history_cleanup.batch_window_end_time",
        )
    }

    /// Parse the window override for a weekday, if any.
    pub fn weekday_window(&self, day: Weekday) -> Result<Option<WindowTimes>, ConfigError> {
        match self.weekdays.get(day) {
            Some(window) => window.resolve(&format!("history_cleanup.weekdays.{}", weekday_name(day))),
            None => Ok(None),
        }
    }

    /// Parsed job log TTL in days.
    pub fn job_log_ttl_days(&self) -> Result<Option<i32>, ConfigError> {
        self.job_log_time_to_live
            .as_deref()
            .map(|ttl| {
                parse_time_to_live(ttl)
                    .map_err(|e| invalid("history_cleanup.job_log_time_to_live", ttl, &e))
            })
            .transpose()
    }
}

/// Which timestamp selects historic data for cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStrategy {
    /// Rows whose removal time has passed.
    #[default]
    RemovalTimeBased,
    /// Rows whose end time plus their definition's TTL has passed.
    EndTimeBased,
}

/// Raw start/end times of one window as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchWindowTimes {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl BatchWindowTimes {
    fn resolve(&self, prefix: &str) -> Result<Option<WindowTimes>, ConfigError> {
        self.resolve_fields(
            &format!("{}.start_time", prefix),
            &format!("{}.end_time", prefix),
        )
    }

    fn resolve_fields(
        &self,
        start_field: &str,
        end_field: &str,
    ) -> Result<Option<WindowTimes>, ConfigError> {
        let start = match &self.start_time {
            Some(raw) => Some(
                parse_window_time(raw).ok_or_else(|| invalid(start_field, raw, "expected HH:mm"))?,
            ),
            None => None,
        };
        let end = match &self.end_time {
            Some(raw) => Some(
                parse_window_time(raw).ok_or_else(|| invalid(end_field, raw, "expected HH:mm"))?,
            ),
            None => None,
        };

        Ok(start.map(|start| WindowTimes {
            start,
            end: end.unwrap_or(start),
        }))
    }
}

/// Parsed window start and end, as UTC times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTimes {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Weekday overrides for the batch window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeekdayWindows {
    #[serde(default)]
    pub monday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub tuesday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub wednesday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub thursday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub friday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub saturday: Option<BatchWindowTimes>,
    #[serde(default)]
    pub sunday: Option<BatchWindowTimes>,
}

impl WeekdayWindows {
    pub fn get(&self, day: Weekday) -> Option<&BatchWindowTimes> {
        match day {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }

    pub fn set(&mut self, day: Weekday, window: BatchWindowTimes) {
        let slot = match day {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        };
        *slot = Some(window);
    }

    fn iter(&self) -> impl Iterator<Item = (Weekday, &BatchWindowTimes)> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter_map(|day| self.get(day).map(|window| (day, window)))
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Parse `HH:mm` with an optional `+HHMM`, `-HHMM` or `+HH:MM` offset and
/// convert it to a UTC time of day.
pub fn parse_window_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if raw.len() < 5 || !raw.is_char_boundary(5) {
        return None;
    }
    let (time, offset) = raw.split_at(5);
    let local = NaiveTime::parse_from_str(time, "%H:%M").ok()?;

    if offset.is_empty() || offset == "Z" {
        return Some(local);
    }

    let sign = match offset.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = offset[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = digits[..2].parse().ok()?;
    let minutes: i64 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    let offset = Duration::minutes(sign * (hours * 60 + minutes));
    Some(local - offset)
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Validation(format!(
        "Invalid value for {}: '{}' ({})",
        field, value, reason
    ))
}
