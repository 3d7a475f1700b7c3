use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{
    ID_CHUNK_SIZE, SqliteQuery, bind_ids, from_millis, id_chunks, minute_filter,
    opt_from_millis, opt_to_millis, placeholders, plus_days, to_millis,
};
use crate::{
    config::CleanupStrategy,
    db::{
        error::{DbError, DbResult},
        repos::{BatchRepo, BatchTimeToLive, CleanupCriteria},
    },
    models::{Batch, CleanableCounts, HistoricBatch},
};

/// Tables holding rows written on behalf of a batch.
const BATCH_SCOPED_TABLES: &[&str] = &["hi_job_logs", "hi_incidents", "hi_op_log", "byte_arrays"];

const BATCH_COLUMNS: &str = r#"
    id, batch_type, total_jobs, jobs_created, batch_jobs_per_seed, invocations_per_batch_job,
    seed_job_definition_id, monitor_job_definition_id, batch_job_definition_id,
    configuration_byte_array_id, create_user_id, suspended, start_time, execution_start_time
"#;

const HISTORIC_BATCH_COLUMNS: &str = r#"
    id, batch_type, total_jobs, batch_jobs_per_seed, invocations_per_batch_job,
    seed_job_definition_id, monitor_job_definition_id, batch_job_definition_id,
    create_user_id, start_time, execution_start_time, end_time, removal_time
"#;

pub struct SqliteBatchRepo {
    pool: SqlitePool,
}

impl SqliteBatchRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn batch_from_row(row: &SqliteRow) -> DbResult<Batch> {
        Ok(Batch {
            id: row.get("id"),
            batch_type: row.get("batch_type"),
            total_jobs: row.get("total_jobs"),
            jobs_created: row.get("jobs_created"),
            batch_jobs_per_seed: row.get("batch_jobs_per_seed"),
            invocations_per_batch_job: row.get("invocations_per_batch_job"),
            seed_job_definition_id: row.get("seed_job_definition_id"),
            monitor_job_definition_id: row.get("monitor_job_definition_id"),
            batch_job_definition_id: row.get("batch_job_definition_id"),
            configuration_byte_array_id: row.get("configuration_byte_array_id"),
            create_user_id: row.get("create_user_id"),
            suspended: row.get::<i64, _>("suspended") != 0,
            start_time: from_millis(row.get("start_time"))?,
            execution_start_time: opt_from_millis(row.get("execution_start_time"))?,
        })
    }

    fn historic_from_row(row: &SqliteRow) -> DbResult<HistoricBatch> {
        Ok(HistoricBatch {
            id: row.get("id"),
            batch_type: row.get("batch_type"),
            total_jobs: row.get("total_jobs"),
            batch_jobs_per_seed: row.get("batch_jobs_per_seed"),
            invocations_per_batch_job: row.get("invocations_per_batch_job"),
            seed_job_definition_id: row.get("seed_job_definition_id"),
            monitor_job_definition_id: row.get("monitor_job_definition_id"),
            batch_job_definition_id: row.get("batch_job_definition_id"),
            create_user_id: row.get("create_user_id"),
            start_time: from_millis(row.get("start_time"))?,
            execution_start_time: opt_from_millis(row.get("execution_start_time"))?,
            end_time: opt_from_millis(row.get("end_time"))?,
            removal_time: opt_from_millis(row.get("removal_time"))?,
        })
    }

    /// SQL expression resolving the TTL of a row's `batch_type`.
    fn ttl_expression(ttl: &BatchTimeToLive) -> String {
        if ttl.by_type.is_empty() {
            return "?".to_string();
        }
        let arms = ttl
            .by_type
            .keys()
            .map(|_| "WHEN ? THEN ?")
            .collect::<Vec<_>>()
            .join(" ");
        format!("CASE batch_type {arms} ELSE ? END")
    }

    fn bind_ttl<'q>(mut query: SqliteQuery<'q>, ttl: &'q BatchTimeToLive) -> SqliteQuery<'q> {
        for (batch_type, days) in &ttl.by_type {
            query = query.bind(batch_type.as_str()).bind(*days);
        }
        query.bind(ttl.default_days)
    }
}

#[async_trait]
impl BatchRepo for SqliteBatchRepo {
    async fn insert(&self, batch: &Batch) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO batches (
                id, batch_type, total_jobs, jobs_created, batch_jobs_per_seed,
                invocations_per_batch_job, seed_job_definition_id, monitor_job_definition_id,
                batch_job_definition_id, configuration_byte_array_id, create_user_id, suspended,
                start_time, execution_start_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.batch_type)
        .bind(batch.total_jobs)
        .bind(batch.jobs_created)
        .bind(batch.batch_jobs_per_seed)
        .bind(batch.invocations_per_batch_job)
        .bind(&batch.seed_job_definition_id)
        .bind(&batch.monitor_job_definition_id)
        .bind(&batch.batch_job_definition_id)
        .bind(&batch.configuration_byte_array_id)
        .bind(&batch.create_user_id)
        .bind(batch.suspended)
        .bind(to_millis(batch.start_time))
        .bind(opt_to_millis(batch.execution_start_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DbResult<Option<Batch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::batch_from_row).transpose()
    }

    async fn list(&self) -> DbResult<Vec<Batch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY start_time ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::batch_from_row).collect()
    }

    async fn update(&self, batch: &Batch) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches SET
                jobs_created = ?,
                seed_job_definition_id = ?,
                monitor_job_definition_id = ?,
                batch_job_definition_id = ?,
                suspended = ?,
                execution_start_time = ?
            WHERE id = ?
            "#,
        )
        .bind(batch.jobs_created)
        .bind(&batch.seed_job_definition_id)
        .bind(&batch.monitor_job_definition_id)
        .bind(&batch.batch_job_definition_id)
        .bind(batch.suspended)
        .bind(opt_to_millis(batch.execution_start_time))
        .bind(&batch.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        if batch.execution_start_time.is_some() {
            sqlx::query(
                "UPDATE hi_batches SET execution_start_time = COALESCE(execution_start_time, ?) \
                 WHERE id = ?",
            )
            .bind(opt_to_millis(batch.execution_start_time))
            .bind(&batch.id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM batches WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_historic(&self, batch: &HistoricBatch) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_batches (
                id, batch_type, total_jobs, batch_jobs_per_seed, invocations_per_batch_job,
                seed_job_definition_id, monitor_job_definition_id, batch_job_definition_id,
                create_user_id, start_time, execution_start_time, end_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.batch_type)
        .bind(batch.total_jobs)
        .bind(batch.batch_jobs_per_seed)
        .bind(batch.invocations_per_batch_job)
        .bind(&batch.seed_job_definition_id)
        .bind(&batch.monitor_job_definition_id)
        .bind(&batch.batch_job_definition_id)
        .bind(&batch.create_user_id)
        .bind(to_millis(batch.start_time))
        .bind(opt_to_millis(batch.execution_start_time))
        .bind(opt_to_millis(batch.end_time))
        .bind(opt_to_millis(batch.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_historic(&self, id: &str) -> DbResult<Option<HistoricBatch>> {
        let sql = format!("SELECT {HISTORIC_BATCH_COLUMNS} FROM hi_batches WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::historic_from_row).transpose()
    }

    async fn list_historic(&self) -> DbResult<Vec<HistoricBatch>> {
        let sql =
            format!("SELECT {HISTORIC_BATCH_COLUMNS} FROM hi_batches ORDER BY start_time ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::historic_from_row).collect()
    }

    async fn complete_historic(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE hi_batches
            SET end_time = ?, removal_time = COALESCE(?, removal_time)
            WHERE id = ?
            "#,
        )
        .bind(to_millis(end_time))
        .bind(opt_to_millis(removal_time))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_removal_time(
        &self,
        id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        let removal = opt_to_millis(removal_time);
        let mut tx = self.pool.begin().await?;

        let mut updated = sqlx::query("UPDATE hi_batches SET removal_time = ? WHERE id = ?")
            .bind(removal)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for table in BATCH_SCOPED_TABLES {
            let sql = format!("UPDATE {table} SET removal_time = ? WHERE batch_id = ?");
            updated += sqlx::query(&sql)
                .bind(removal)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_historic_cascade(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in id_chunks(ids, ID_CHUNK_SIZE) {
            let in_list = placeholders(chunk.len());
            let mut statements = vec![format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT exception_byte_array_id FROM hi_job_logs WHERE batch_id IN ({in_list}))"
            )];
            statements.extend(
                BATCH_SCOPED_TABLES
                    .iter()
                    .map(|table| format!("DELETE FROM {table} WHERE batch_id IN ({in_list})")),
            );
            statements.push(format!("DELETE FROM hi_batches WHERE id IN ({in_list})"));

            let mut affected = 0;
            for sql in &statements {
                affected = bind_ids(sqlx::query(sql.as_str()), &chunk)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            // The last statement deletes the batches themselves.
            deleted += affected;
        }
        tx.commit().await?;

        Ok(deleted)
    }

    async fn find_ids_for_cleanup(
        &self,
        criteria: &CleanupCriteria,
        ttl: &BatchTimeToLive,
    ) -> DbResult<Vec<String>> {
        let ids = match criteria.strategy {
            CleanupStrategy::RemovalTimeBased => {
                let sql = format!(
                    r#"
                    SELECT id
                    FROM hi_batches
                    WHERE removal_time IS NOT NULL AND removal_time <= ? {}
                    ORDER BY removal_time ASC
                    LIMIT ?
                    "#,
                    minute_filter("removal_time", criteria)
                );
                sqlx::query_scalar::<_, String>(&sql)
                    .bind(to_millis(criteria.now))
                    .bind(criteria.batch_size)
                    .fetch_all(&self.pool)
                    .await?
            }
            CleanupStrategy::EndTimeBased => {
                let sql = format!(
                    r#"
                    SELECT id
                    FROM (
                        SELECT id, end_time, {} AS ttl
                        FROM hi_batches
                        WHERE end_time IS NOT NULL
                    )
                    WHERE ttl IS NOT NULL AND {} <= ? {}
                    ORDER BY end_time ASC
                    LIMIT ?
                    "#,
                    Self::ttl_expression(ttl),
                    plus_days("end_time", "ttl"),
                    minute_filter("end_time", criteria)
                );
                let rows = Self::bind_ttl(sqlx::query(&sql), ttl)
                    .bind(to_millis(criteria.now))
                    .bind(criteria.batch_size)
                    .fetch_all(&self.pool)
                    .await?;
                rows.iter().map(|row| row.get("id")).collect()
            }
        };
        Ok(ids)
    }

    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
        ttl: &BatchTimeToLive,
    ) -> DbResult<Vec<(String, CleanableCounts)>> {
        let rows = match criteria.strategy {
            CleanupStrategy::RemovalTimeBased => {
                sqlx::query(
                    r#"
                    SELECT batch_type,
                           COUNT(*) AS finished,
                           COALESCE(SUM(CASE WHEN removal_time IS NOT NULL AND removal_time <= ?
                                        THEN 1 ELSE 0 END), 0) AS cleanable
                    FROM hi_batches
                    WHERE end_time IS NOT NULL
                    GROUP BY batch_type
                    "#,
                )
                .bind(to_millis(criteria.now))
                .fetch_all(&self.pool)
                .await?
            }
            CleanupStrategy::EndTimeBased => {
                // The `now` placeholder precedes the TTL placeholders in the text.
                let sql = format!(
                    r#"
                    SELECT batch_type,
                           COUNT(*) AS finished,
                           COALESCE(SUM(CASE WHEN ttl IS NOT NULL AND {} <= ?
                                        THEN 1 ELSE 0 END), 0) AS cleanable
                    FROM (
                        SELECT batch_type, end_time, {} AS ttl
                        FROM hi_batches
                        WHERE end_time IS NOT NULL
                    )
                    GROUP BY batch_type
                    "#,
                    plus_days("end_time", "ttl"),
                    Self::ttl_expression(ttl)
                );
                let query = sqlx::query(&sql).bind(to_millis(criteria.now));
                Self::bind_ttl(query, ttl).fetch_all(&self.pool).await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get("batch_type"),
                    CleanableCounts {
                        finished: row.get("finished"),
                        cleanable: row.get("cleanable"),
                    },
                )
            })
            .collect())
    }
}
