use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{
    ID_CHUNK_SIZE, bind_ids, from_millis, id_chunks, minute_filter, opt_from_millis,
    opt_to_millis, parse_column, placeholders, plus_days, to_millis,
};
use crate::{
    config::CleanupStrategy,
    db::{
        error::{DbError, DbResult},
        repos::{CleanupCriteria, DefinitionCounts, ProcessHistoryRepo},
    },
    models::{
        CleanableCounts, HistoricActivityInstance, HistoricIncident, HistoricProcessInstance,
        HistoricProcessInstanceQuery, HistoricTaskInstance, HistoricVariableInstance,
        ProcessInstanceState,
    },
};

/// Tables carrying a `root_process_instance_id` column.
const ROOT_SCOPED_TABLES: &[&str] = &[
    "hi_process_instances",
    "hi_activity_instances",
    "hi_task_instances",
    "hi_variables",
    "hi_incidents",
    "hi_job_logs",
    "hi_decision_instances",
    "hi_decision_values",
    "byte_arrays",
    "hi_op_log",
];

/// Tables whose rows belong to a single process instance.
const INSTANCE_SCOPED_TABLES: &[&str] = &[
    "hi_activity_instances",
    "hi_task_instances",
    "hi_variables",
    "hi_incidents",
    "hi_job_logs",
    "hi_op_log",
    "hi_decision_instances",
];

const PROCESS_INSTANCE_COLUMNS: &str = r#"
    id, process_definition_id, process_definition_key, deployment_id, business_key,
    root_process_instance_id, super_process_instance_id, state, start_user_id,
    start_time, end_time, removal_time
"#;

pub struct SqliteProcessHistoryRepo {
    pool: SqlitePool,
    id_chunk_size: usize,
}

impl SqliteProcessHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            id_chunk_size: ID_CHUNK_SIZE,
        }
    }

    /// Bind at most `size` ids per statement.
    pub fn with_id_chunk_size(mut self, size: usize) -> Self {
        self.id_chunk_size = size.max(1);
        self
    }

    fn process_instance_from_row(row: &SqliteRow) -> DbResult<HistoricProcessInstance> {
        Ok(HistoricProcessInstance {
            id: row.get("id"),
            process_definition_id: row.get("process_definition_id"),
            process_definition_key: row.get("process_definition_key"),
            deployment_id: row.get("deployment_id"),
            business_key: row.get("business_key"),
            root_process_instance_id: row.get("root_process_instance_id"),
            super_process_instance_id: row.get("super_process_instance_id"),
            state: parse_column(&row.get::<String, _>("state"))?,
            start_user_id: row.get("start_user_id"),
            start_time: from_millis(row.get("start_time"))?,
            end_time: opt_from_millis(row.get("end_time"))?,
            removal_time: opt_from_millis(row.get("removal_time"))?,
        })
    }

    /// WHERE clause and string binds for a process instance query.
    fn query_filter(query: &HistoricProcessInstanceQuery) -> (String, Vec<&str>) {
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
        if let Some(id) = &query.process_definition_id {
            conditions.push("process_definition_id = ?".to_string());
            binds.push(id);
        }
        if let Some(key) = &query.process_definition_key {
            conditions.push("process_definition_key = ?".to_string());
            binds.push(key);
        }
        if let Some(root) = &query.root_process_instance_id {
            conditions.push("root_process_instance_id = ?".to_string());
            binds.push(root);
        }
        match query.finished {
            Some(true) => conditions.push("end_time IS NOT NULL".to_string()),
            Some(false) => conditions.push("end_time IS NULL".to_string()),
            None => {}
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (clause, binds)
    }

    async fn fetch_process_instances(
        &self,
        query: &HistoricProcessInstanceQuery,
    ) -> DbResult<Vec<HistoricProcessInstance>> {
        let (filter, binds) = Self::query_filter(query);
        let limit = query
            .limit
            .map(|limit| format!("LIMIT {}", limit))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {PROCESS_INSTANCE_COLUMNS} FROM hi_process_instances {filter} \
             ORDER BY start_time ASC, id ASC {limit}"
        );

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::process_instance_from_row).collect()
    }

    async fn count_chunk(&self, query: &HistoricProcessInstanceQuery) -> DbResult<i64> {
        let (filter, binds) = Self::query_filter(query);
        let sql = format!("SELECT COUNT(*) FROM hi_process_instances {filter}");

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    /// Delete one chunk of process instances and their rows within `tx`.
    async fn delete_chunk(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        ids: &[String],
    ) -> DbResult<u64> {
        let in_list = placeholders(ids.len());
        let mut statements = vec![
            format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT byte_array_id FROM hi_variables WHERE process_instance_id IN ({in_list}))"
            ),
            format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT exception_byte_array_id FROM hi_job_logs WHERE process_instance_id IN ({in_list}))"
            ),
            format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT v.byte_array_id FROM hi_decision_values v \
                  JOIN hi_decision_instances d ON d.id = v.decision_instance_id \
                  WHERE d.process_instance_id IN ({in_list}))"
            ),
            format!(
                "DELETE FROM hi_decision_values WHERE decision_instance_id IN \
                 (SELECT id FROM hi_decision_instances WHERE process_instance_id IN ({in_list}))"
            ),
        ];
        statements.extend(INSTANCE_SCOPED_TABLES.iter().map(|table| {
            format!("DELETE FROM {table} WHERE process_instance_id IN ({in_list})")
        }));

        for sql in &statements {
            bind_ids(sqlx::query(sql.as_str()), ids)
                .execute(&mut **tx)
                .await?;
        }
        let sql = format!("DELETE FROM hi_process_instances WHERE id IN ({in_list})");
        let result = bind_ids(sqlx::query(sql.as_str()), ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Condition selecting finished instances that are due for cleanup.
    /// Expects `pi` for the instance and `d` for its definition.
    fn cleanable_condition(strategy: CleanupStrategy) -> String {
        match strategy {
            CleanupStrategy::RemovalTimeBased => {
                "pi.removal_time IS NOT NULL AND pi.removal_time <= ?".to_string()
            }
            CleanupStrategy::EndTimeBased => format!(
                "pi.end_time IS NOT NULL AND d.history_time_to_live IS NOT NULL AND {} <= ?",
                plus_days("pi.end_time", "d.history_time_to_live")
            ),
        }
    }
}

#[async_trait]
impl ProcessHistoryRepo for SqliteProcessHistoryRepo {
    async fn insert_process_instance(&self, instance: &HistoricProcessInstance) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_process_instances (
                id, process_definition_id, process_definition_key, deployment_id, business_key,
                root_process_instance_id, super_process_instance_id, state, start_user_id,
                start_time, end_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.process_definition_id)
        .bind(&instance.process_definition_key)
        .bind(&instance.deployment_id)
        .bind(&instance.business_key)
        .bind(&instance.root_process_instance_id)
        .bind(&instance.super_process_instance_id)
        .bind(instance.state.as_str())
        .bind(&instance.start_user_id)
        .bind(to_millis(instance.start_time))
        .bind(opt_to_millis(instance.end_time))
        .bind(opt_to_millis(instance.removal_time))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("Historic process instance '{}' already exists", instance.id),
            ),
            _ => DbError::from(e),
        })?;
        Ok(())
    }

    async fn get_process_instance(&self, id: &str) -> DbResult<Option<HistoricProcessInstance>> {
        let sql = format!("SELECT {PROCESS_INSTANCE_COLUMNS} FROM hi_process_instances WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::process_instance_from_row).transpose()
    }

    async fn list_process_instances(
        &self,
        query: &HistoricProcessInstanceQuery,
    ) -> DbResult<Vec<HistoricProcessInstance>> {
        let Some(ids) = query.ids.as_ref().filter(|ids| ids.len() > self.id_chunk_size) else {
            return self.fetch_process_instances(query).await;
        };
        let mut instances = Vec::with_capacity(ids.len());
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let chunk_query = HistoricProcessInstanceQuery {
                ids: Some(chunk),
                limit: None,
                ..query.clone()
            };
            instances.extend(self.fetch_process_instances(&chunk_query).await?);
        }
        instances.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
        if let Some(limit) = query.limit {
            instances.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(instances)
    }

    async fn count_process_instances(&self, query: &HistoricProcessInstanceQuery) -> DbResult<i64> {
        let Some(ids) = query.ids.as_ref().filter(|ids| ids.len() > self.id_chunk_size) else {
            return self.count_chunk(query).await;
        };
        let mut count = 0;
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let chunk_query = HistoricProcessInstanceQuery {
                ids: Some(chunk),
                ..query.clone()
            };
            count += self.count_chunk(&chunk_query).await?;
        }
        Ok(count)
    }

    async fn end_process_instance(
        &self,
        id: &str,
        state: ProcessInstanceState,
        end_time: DateTime<Utc>,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE hi_process_instances SET state = ?, end_time = ? WHERE id = ?")
                .bind(state.as_str())
                .bind(to_millis(end_time))
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn insert_activity_instance(&self, activity: &HistoricActivityInstance) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_activity_instances (
                id, process_instance_id, root_process_instance_id, activity_id, activity_type,
                start_time, end_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.process_instance_id)
        .bind(&activity.root_process_instance_id)
        .bind(&activity.activity_id)
        .bind(&activity.activity_type)
        .bind(to_millis(activity.start_time))
        .bind(opt_to_millis(activity.end_time))
        .bind(opt_to_millis(activity.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activity_instances(
        &self,
        process_instance_id: &str,
    ) -> DbResult<Vec<HistoricActivityInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, process_instance_id, root_process_instance_id, activity_id, activity_type,
                   start_time, end_time, removal_time
            FROM hi_activity_instances
            WHERE process_instance_id = ?
            ORDER BY start_time ASC, id ASC
            "#,
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(HistoricActivityInstance {
                    id: row.get("id"),
                    process_instance_id: row.get("process_instance_id"),
                    root_process_instance_id: row.get("root_process_instance_id"),
                    activity_id: row.get("activity_id"),
                    activity_type: row.get("activity_type"),
                    start_time: from_millis(row.get("start_time"))?,
                    end_time: opt_from_millis(row.get("end_time"))?,
                    removal_time: opt_from_millis(row.get("removal_time"))?,
                })
            })
            .collect()
    }

    async fn insert_task_instance(&self, task: &HistoricTaskInstance) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_task_instances (
                id, process_instance_id, root_process_instance_id, name, assignee,
                start_time, end_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.process_instance_id)
        .bind(&task.root_process_instance_id)
        .bind(&task.name)
        .bind(&task.assignee)
        .bind(to_millis(task.start_time))
        .bind(opt_to_millis(task.end_time))
        .bind(opt_to_millis(task.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_task_instances(
        &self,
        process_instance_id: &str,
    ) -> DbResult<Vec<HistoricTaskInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, process_instance_id, root_process_instance_id, name, assignee,
                   start_time, end_time, removal_time
            FROM hi_task_instances
            WHERE process_instance_id = ?
            ORDER BY start_time ASC, id ASC
            "#,
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(HistoricTaskInstance {
                    id: row.get("id"),
                    process_instance_id: row.get("process_instance_id"),
                    root_process_instance_id: row.get("root_process_instance_id"),
                    name: row.get("name"),
                    assignee: row.get("assignee"),
                    start_time: from_millis(row.get("start_time"))?,
                    end_time: opt_from_millis(row.get("end_time"))?,
                    removal_time: opt_from_millis(row.get("removal_time"))?,
                })
            })
            .collect()
    }

    async fn insert_variable(&self, variable: &HistoricVariableInstance) -> DbResult<()> {
        let value = variable
            .value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO hi_variables (
                id, process_instance_id, root_process_instance_id, name, value, byte_array_id,
                create_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&variable.id)
        .bind(&variable.process_instance_id)
        .bind(&variable.root_process_instance_id)
        .bind(&variable.name)
        .bind(value)
        .bind(&variable.byte_array_id)
        .bind(to_millis(variable.create_time))
        .bind(opt_to_millis(variable.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_variables(
        &self,
        process_instance_id: &str,
    ) -> DbResult<Vec<HistoricVariableInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, process_instance_id, root_process_instance_id, name, value, byte_array_id,
                   create_time, removal_time
            FROM hi_variables
            WHERE process_instance_id = ?
            ORDER BY create_time ASC, id ASC
            "#,
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let value: Option<String> = row.get("value");
                Ok(HistoricVariableInstance {
                    id: row.get("id"),
                    process_instance_id: row.get("process_instance_id"),
                    root_process_instance_id: row.get("root_process_instance_id"),
                    name: row.get("name"),
                    value: value.as_deref().map(serde_json::from_str).transpose()?,
                    byte_array_id: row.get("byte_array_id"),
                    create_time: from_millis(row.get("create_time"))?,
                    removal_time: opt_from_millis(row.get("removal_time"))?,
                })
            })
            .collect()
    }

    async fn insert_incident(&self, incident: &HistoricIncident) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_incidents (
                id, incident_type, message, configuration, job_definition_id,
                process_instance_id, root_process_instance_id, batch_id,
                create_time, end_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&incident.id)
        .bind(&incident.incident_type)
        .bind(&incident.message)
        .bind(&incident.configuration)
        .bind(&incident.job_definition_id)
        .bind(&incident.process_instance_id)
        .bind(&incident.root_process_instance_id)
        .bind(&incident.batch_id)
        .bind(to_millis(incident.create_time))
        .bind(opt_to_millis(incident.end_time))
        .bind(opt_to_millis(incident.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn end_incidents_for_configuration(
        &self,
        configuration: &str,
        end_time: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE hi_incidents SET end_time = ? WHERE configuration = ? AND end_time IS NULL",
        )
        .bind(to_millis(end_time))
        .bind(configuration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_incidents(&self, process_instance_id: &str) -> DbResult<Vec<HistoricIncident>> {
        let rows = sqlx::query(
            r#"
            SELECT id, incident_type, message, configuration, job_definition_id,
                   process_instance_id, root_process_instance_id, batch_id,
                   create_time, end_time, removal_time
            FROM hi_incidents
            WHERE process_instance_id = ?
            ORDER BY create_time ASC, id ASC
            "#,
        )
        .bind(process_instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(incident_from_row).collect()
    }

    async fn set_removal_time_for_root(
        &self,
        root_process_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        let removal = opt_to_millis(removal_time);
        let mut updated = 0;

        let mut tx = self.pool.begin().await?;
        for table in ROOT_SCOPED_TABLES {
            let sql = format!("UPDATE {table} SET removal_time = ? WHERE root_process_instance_id = ?");
            let result = sqlx::query(&sql)
                .bind(removal)
                .bind(root_process_instance_id)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;

        Ok(updated)
    }

    async fn set_removal_time_for_instance(
        &self,
        process_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        let removal = opt_to_millis(removal_time);
        let mut updated = 0;

        let mut tx = self.pool.begin().await?;

        let dependent = [
            r#"
            UPDATE byte_arrays SET removal_time = ?
            WHERE id IN (SELECT byte_array_id FROM hi_variables WHERE process_instance_id = ?)
            "#,
            r#"
            UPDATE byte_arrays SET removal_time = ?
            WHERE id IN (SELECT exception_byte_array_id FROM hi_job_logs WHERE process_instance_id = ?)
            "#,
            r#"
            UPDATE hi_decision_values SET removal_time = ?
            WHERE decision_instance_id IN (
                SELECT id FROM hi_decision_instances WHERE process_instance_id = ?
            )
            "#,
            "UPDATE hi_process_instances SET removal_time = ? WHERE id = ?",
        ];
        for sql in dependent {
            let result = sqlx::query(sql)
                .bind(removal)
                .bind(process_instance_id)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }

        for table in INSTANCE_SCOPED_TABLES {
            let sql = format!("UPDATE {table} SET removal_time = ? WHERE process_instance_id = ?");
            let result = sqlx::query(&sql)
                .bind(removal)
                .bind(process_instance_id)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in id_chunks(ids, self.id_chunk_size) {
            deleted += Self::delete_chunk(&mut tx, &chunk).await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn find_ids_for_cleanup(&self, criteria: &CleanupCriteria) -> DbResult<Vec<String>> {
        let sql = match criteria.strategy {
            CleanupStrategy::RemovalTimeBased => format!(
                r#"
                SELECT pi.id
                FROM hi_process_instances pi
                WHERE {} {}
                ORDER BY pi.removal_time ASC
                LIMIT ?
                "#,
                Self::cleanable_condition(criteria.strategy),
                minute_filter("pi.removal_time", criteria)
            ),
            CleanupStrategy::EndTimeBased => format!(
                r#"
                SELECT pi.id
                FROM hi_process_instances pi
                JOIN definitions d ON d.id = pi.process_definition_id
                WHERE {} {}
                ORDER BY pi.end_time ASC
                LIMIT ?
                "#,
                Self::cleanable_condition(criteria.strategy),
                minute_filter("pi.end_time", criteria)
            ),
        };

        let ids = sqlx::query_scalar::<_, String>(&sql)
            .bind(to_millis(criteria.now))
            .bind(criteria.batch_size)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn cleanable_counts(
        &self,
        criteria: &CleanupCriteria,
    ) -> DbResult<Vec<DefinitionCounts>> {
        let sql = format!(
            r#"
            SELECT pi.process_definition_id AS definition_id,
                   COALESCE(SUM(CASE WHEN pi.end_time IS NOT NULL THEN 1 ELSE 0 END), 0) AS finished,
                   COALESCE(SUM(CASE WHEN pi.end_time IS NOT NULL AND {} THEN 1 ELSE 0 END), 0) AS cleanable
            FROM hi_process_instances pi
            LEFT JOIN definitions d ON d.id = pi.process_definition_id
            GROUP BY pi.process_definition_id
            "#,
            Self::cleanable_condition(criteria.strategy)
        );

        let rows = sqlx::query(&sql)
            .bind(to_millis(criteria.now))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get("definition_id"),
                    CleanableCounts {
                        finished: row.get("finished"),
                        cleanable: row.get("cleanable"),
                    },
                )
            })
            .collect())
    }
}

pub(super) fn incident_from_row(row: &SqliteRow) -> DbResult<HistoricIncident> {
    Ok(HistoricIncident {
        id: row.get("id"),
        incident_type: row.get("incident_type"),
        message: row.get("message"),
        configuration: row.get("configuration"),
        job_definition_id: row.get("job_definition_id"),
        process_instance_id: row.get("process_instance_id"),
        root_process_instance_id: row.get("root_process_instance_id"),
        batch_id: row.get("batch_id"),
        create_time: from_millis(row.get("create_time"))?,
        end_time: opt_from_millis(row.get("end_time"))?,
        removal_time: opt_from_millis(row.get("removal_time"))?,
    })
}
