//! Per-job configuration of history cleanup jobs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{db::LAST_MINUTE, error::EngineResult};

/// Base delay after a run that found too little to delete.
const START_DELAY_SECS: i64 = 10;
/// Cap of the exponential delay.
const MAX_DELAY_SECS: i64 = 3600;

/// Stored as JSON in the job's handler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCleanupJobConfig {
    /// Consecutive runs that found less than the batch threshold.
    #[serde(default)]
    pub count_empty_runs: u32,
    /// Run regardless of the batch window.
    #[serde(default)]
    pub immediately_due: bool,
    pub minute_from: u32,
    pub minute_to: u32,
}

impl HistoryCleanupJobConfig {
    pub fn new(minute_from: u32, minute_to: u32, immediately_due: bool) -> Self {
        Self {
            count_empty_runs: 0,
            immediately_due,
            minute_from,
            minute_to,
        }
    }

    pub fn parse(raw: Option<&str>) -> EngineResult<Self> {
        let raw = raw.unwrap_or("{}");
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// `now` plus an exponential delay: 10s doubled per empty run, at most an hour.
    pub fn next_run_with_delay(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = 2_i64
            .checked_pow(self.count_empty_runs)
            .and_then(|factor| factor.checked_mul(START_DELAY_SECS))
            .map_or(MAX_DELAY_SECS, |secs| secs.min(MAX_DELAY_SECS));
        now + Duration::seconds(delay)
    }
}

/// Split the hour into `degree` contiguous minute ranges, one per job.
/// The last range absorbs the remainder and ends at minute 59.
pub fn minute_chunks(degree: u32) -> Vec<(u32, u32)> {
    let degree = degree.clamp(1, 60);
    let len = 60 / degree;
    (0..degree)
        .map(|i| {
            let from = i * len;
            let to = if i + 1 == degree {
                LAST_MINUTE
            } else {
                (i + 1) * len - 1
            };
            (from, to)
        })
        .collect()
}
