use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{
    ID_CHUNK_SIZE, bind_ids, from_millis, id_chunks, minute_filter, opt_from_millis,
    opt_to_millis, parse_column, placeholders, to_millis,
};
use crate::{
    db::{
        error::DbResult,
        repos::{CleanupCriteria, JobLogRepo},
    },
    models::HistoricJobLog,
};

const JOB_LOG_COLUMNS: &str = r#"
    id, job_id, job_type, job_definition_id, job_definition_configuration, deployment_id,
    process_instance_id, root_process_instance_id, batch_id, state, job_retries,
    exception_message, exception_byte_array_id, timestamp, removal_time
"#;

pub struct SqliteJobLogRepo {
    pool: SqlitePool,
}

impl SqliteJobLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> DbResult<HistoricJobLog> {
        Ok(HistoricJobLog {
            id: row.get("id"),
            job_id: row.get("job_id"),
            job_type: row.get("job_type"),
            job_definition_id: row.get("job_definition_id"),
            job_definition_configuration: row.get("job_definition_configuration"),
            deployment_id: row.get("deployment_id"),
            process_instance_id: row.get("process_instance_id"),
            root_process_instance_id: row.get("root_process_instance_id"),
            batch_id: row.get("batch_id"),
            state: parse_column(&row.get::<String, _>("state"))?,
            job_retries: row.get("job_retries"),
            exception_message: row.get("exception_message"),
            exception_byte_array_id: row.get("exception_byte_array_id"),
            timestamp: from_millis(row.get("timestamp"))?,
            removal_time: opt_from_millis(row.get("removal_time"))?,
        })
    }
}

#[async_trait]
impl JobLogRepo for SqliteJobLogRepo {
    async fn insert(&self, log: &HistoricJobLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_job_logs (
                id, job_id, job_type, job_definition_id, job_definition_configuration,
                deployment_id, process_instance_id, root_process_instance_id, batch_id, state,
                job_retries, exception_message, exception_byte_array_id, timestamp, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.job_id)
        .bind(&log.job_type)
        .bind(&log.job_definition_id)
        .bind(&log.job_definition_configuration)
        .bind(&log.deployment_id)
        .bind(&log.process_instance_id)
        .bind(&log.root_process_instance_id)
        .bind(&log.batch_id)
        .bind(log.state.as_str())
        .bind(log.job_retries)
        .bind(&log.exception_message)
        .bind(&log.exception_byte_array_id)
        .bind(to_millis(log.timestamp))
        .bind(opt_to_millis(log.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_job(&self, job_id: &str) -> DbResult<Vec<HistoricJobLog>> {
        let sql = format!(
            "SELECT {JOB_LOG_COLUMNS} FROM hi_job_logs WHERE job_id = ? ORDER BY timestamp ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql).bind(job_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_job_type(&self, job_type: &str) -> DbResult<Vec<HistoricJobLog>> {
        let sql = format!(
            "SELECT {JOB_LOG_COLUMNS} FROM hi_job_logs WHERE job_type = ? ORDER BY timestamp ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(job_type)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn find_ids_for_cleanup(
        &self,
        job_type: &str,
        cutoff: DateTime<Utc>,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<String>> {
        let sql = format!(
            r#"
            SELECT id
            FROM hi_job_logs
            WHERE job_type = ? AND timestamp <= ? {}
            ORDER BY timestamp ASC
            LIMIT ?
            "#,
            minute_filter("timestamp", criteria)
        );

        let ids = sqlx::query_scalar::<_, String>(&sql)
            .bind(job_type)
            .bind(to_millis(cutoff))
            .bind(criteria.batch_size)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in id_chunks(ids, ID_CHUNK_SIZE) {
            let in_list = placeholders(chunk.len());
            let byte_arrays = format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT exception_byte_array_id FROM hi_job_logs WHERE id IN ({in_list}))"
            );
            let logs = format!("DELETE FROM hi_job_logs WHERE id IN ({in_list})");

            bind_ids(sqlx::query(byte_arrays.as_str()), &chunk)
                .execute(&mut *tx)
                .await?;
            deleted += bind_ids(sqlx::query(logs.as_str()), &chunk)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(deleted)
    }
}
