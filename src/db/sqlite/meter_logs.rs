use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::common::{opt_to_millis, to_millis};
use crate::{
    db::{error::DbResult, repos::MeterLogRepo},
    models::MeterLogEntry,
};

pub struct SqliteMeterLogRepo {
    pool: SqlitePool,
}

impl SqliteMeterLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MeterLogRepo for SqliteMeterLogRepo {
    async fn insert(&self, entry: &MeterLogEntry) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO meter_logs (id, name, reporter, value, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.name)
        .bind(&entry.reporter)
        .bind(entry.value)
        .bind(to_millis(entry.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sum(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(value), 0)
            FROM meter_logs
            WHERE name = ?
              AND (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp < ?)
            "#,
        )
        .bind(name)
        .bind(opt_to_millis(start))
        .bind(opt_to_millis(start))
        .bind(opt_to_millis(end))
        .bind(opt_to_millis(end))
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}
