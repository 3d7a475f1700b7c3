use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{from_millis, opt_from_millis, opt_to_millis, placeholders, to_millis};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::JobRepo,
    },
    models::{Incident, Job, JobDefinition, JobQuery},
};

const JOB_COLUMNS: &str = r#"
    id, job_type, handler_configuration, job_definition_id, deployment_id, process_instance_id,
    due_date, retries, exception_message, exception_byte_array_id, suspended, priority, create_time
"#;

pub struct SqliteJobRepo {
    pool: SqlitePool,
}

impl SqliteJobRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &SqliteRow) -> DbResult<Job> {
        Ok(Job {
            id: row.get("id"),
            job_type: row.get("job_type"),
            handler_configuration: row.get("handler_configuration"),
            job_definition_id: row.get("job_definition_id"),
            deployment_id: row.get("deployment_id"),
            process_instance_id: row.get("process_instance_id"),
            due_date: opt_from_millis(row.get("due_date"))?,
            retries: row.get("retries"),
            exception_message: row.get("exception_message"),
            exception_byte_array_id: row.get("exception_byte_array_id"),
            suspended: row.get::<i64, _>("suspended") != 0,
            priority: row.get("priority"),
            create_time: from_millis(row.get("create_time"))?,
        })
    }

    fn query_filter(query: &JobQuery) -> (String, Vec<&str>) {
        let mut conditions = Vec::new();
        let mut binds: Vec<&str> = Vec::new();

        if let Some(ids) = &query.ids {
            if ids.is_empty() {
                conditions.push("1 = 0".to_string());
            } else {
                conditions.push(format!("id IN ({})", placeholders(ids.len())));
                binds.extend(ids.iter().map(String::as_str));
            }
        }
        if let Some(job_type) = &query.job_type {
            conditions.push("job_type = ?".to_string());
            binds.push(job_type);
        }
        if let Some(definition_id) = &query.job_definition_id {
            conditions.push("job_definition_id = ?".to_string());
            binds.push(definition_id);
        }
        match query.suspended {
            Some(true) => conditions.push("suspended = 1".to_string()),
            Some(false) => conditions.push("suspended = 0".to_string()),
            None => {}
        }
        if query.with_exception {
            conditions.push("exception_message IS NOT NULL".to_string());
        }
        if query.no_retries_left {
            conditions.push("retries = 0".to_string());
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (clause, binds)
    }
}

#[async_trait]
impl JobRepo for SqliteJobRepo {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, job_type, handler_configuration, job_definition_id, deployment_id,
                process_instance_id, due_date, retries, exception_message, exception_byte_array_id,
                suspended, priority, create_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.job_type)
        .bind(&job.handler_configuration)
        .bind(&job.job_definition_id)
        .bind(&job.deployment_id)
        .bind(&job.process_instance_id)
        .bind(opt_to_millis(job.due_date))
        .bind(job.retries)
        .bind(&job.exception_message)
        .bind(&job.exception_byte_array_id)
        .bind(job.suspended)
        .bind(job.priority)
        .bind(to_millis(job.create_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DbResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn update(&self, job: &Job) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                handler_configuration = ?,
                due_date = ?,
                retries = ?,
                exception_message = ?,
                exception_byte_array_id = ?,
                suspended = ?,
                priority = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.handler_configuration)
        .bind(opt_to_millis(job.due_date))
        .bind(job.retries)
        .bind(&job.exception_message)
        .bind(&job.exception_byte_array_id)
        .bind(job.suspended)
        .bind(job.priority)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, query: &JobQuery) -> DbResult<Vec<Job>> {
        let (filter, binds) = Self::query_filter(query);
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs {filter} ORDER BY create_time ASC, rowid ASC");

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::job_from_row).collect()
    }

    async fn count(&self, query: &JobQuery) -> DbResult<i64> {
        let (filter, binds) = Self::query_filter(query);
        let sql = format!("SELECT COUNT(*) FROM jobs {filter}");

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn find_acquirable(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE suspended = 0
              AND retries > 0
              AND (due_date IS NULL OR due_date <= ?)
              AND (job_definition_id IS NULL OR job_definition_id NOT IN (
                  SELECT id FROM job_definitions WHERE suspended = 1
              ))
            ORDER BY due_date ASC, priority DESC, rowid ASC
            LIMIT ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(to_millis(now))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::job_from_row).collect()
    }

    async fn delete_by_definition(&self, job_definition_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_definition_id = ?")
            .bind(job_definition_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_definition(&self, definition: &JobDefinition) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO job_definitions (id, job_type, job_configuration, suspended) VALUES (?, ?, ?, ?)",
        )
        .bind(&definition.id)
        .bind(&definition.job_type)
        .bind(&definition.job_configuration)
        .bind(definition.suspended)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_definition(&self, id: &str) -> DbResult<Option<JobDefinition>> {
        let row = sqlx::query(
            "SELECT id, job_type, job_configuration, suspended FROM job_definitions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| JobDefinition {
            id: row.get("id"),
            job_type: row.get("job_type"),
            job_configuration: row.get("job_configuration"),
            suspended: row.get::<i64, _>("suspended") != 0,
        }))
    }

    async fn set_definition_suspended(&self, id: &str, suspended: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE job_definitions SET suspended = ? WHERE id = ?")
            .bind(suspended)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn delete_definition(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM job_definitions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_incident(&self, incident: &Incident) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, incident_type, message, configuration, job_definition_id,
                process_instance_id, create_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&incident.id)
        .bind(&incident.incident_type)
        .bind(&incident.message)
        .bind(&incident.configuration)
        .bind(&incident.job_definition_id)
        .bind(&incident.process_instance_id)
        .bind(to_millis(incident.create_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_incidents_for_job(&self, job_id: &str) -> DbResult<Vec<Incident>> {
        let rows = sqlx::query(
            r#"
            SELECT id, incident_type, message, configuration, job_definition_id,
                   process_instance_id, create_time
            FROM incidents
            WHERE configuration = ?
            ORDER BY create_time ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Incident {
                    id: row.get("id"),
                    incident_type: row.get("incident_type"),
                    message: row.get("message"),
                    configuration: row.get("configuration"),
                    job_definition_id: row.get("job_definition_id"),
                    process_instance_id: row.get("process_instance_id"),
                    create_time: from_millis(row.get("create_time"))?,
                })
            })
            .collect()
    }

    async fn delete_incidents_for_job(&self, job_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM incidents WHERE configuration = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
