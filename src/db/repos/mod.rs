mod authorizations;
mod batches;
mod byte_arrays;
mod case_history;
mod decision_history;
mod definitions;
mod job_logs;
mod jobs;
mod meter_logs;
mod operation_log;
mod process_history;

pub use authorizations::*;
pub use batches::*;
pub use byte_arrays::*;
pub use case_history::*;
use chrono::{DateTime, Utc};
pub use decision_history::*;
pub use definitions::*;
pub use job_logs::*;
pub use jobs::*;
pub use meter_logs::*;
pub use operation_log::*;
pub use process_history::*;

use crate::config::CleanupStrategy;

/// Last minute of an hour; a `0..=59` range selects every row.
pub const LAST_MINUTE: u32 = 59;

/// Selection parameters shared by the history cleanup queries.
///
/// A row belongs to the minute partition `(timestamp / 60000) % 60`, where the
/// timestamp is the removal time or the end time depending on the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupCriteria {
    pub strategy: CleanupStrategy,
    pub now: DateTime<Utc>,
    pub minute_from: u32,
    pub minute_to: u32,
    pub batch_size: i64,
}

impl CleanupCriteria {
    /// True when the minute range covers the whole hour.
    pub fn covers_full_hour(&self) -> bool {
        self.minute_from == 0 && self.minute_to >= LAST_MINUTE
    }
}
