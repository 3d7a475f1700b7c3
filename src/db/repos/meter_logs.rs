use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{db::error::DbResult, models::MeterLogEntry};

#[async_trait]
pub trait MeterLogRepo: Send + Sync {
    async fn insert(&self, entry: &MeterLogEntry) -> DbResult<()>;

    /// Sum of a metric, optionally bounded to `[start, end)`.
    async fn sum(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DbResult<i64>;
}
