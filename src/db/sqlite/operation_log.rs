use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::common::{from_millis, opt_from_millis, parse_column, to_millis};
use crate::{
    db::{error::DbResult, repos::OperationLogRepo},
    models::{CreateUserOperation, UserOperationLogEntry, UserOperationLogQuery, new_id},
};

pub struct SqliteOperationLogRepo {
    pool: SqlitePool,
}

impl SqliteOperationLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationLogRepo for SqliteOperationLogRepo {
    async fn create(
        &self,
        input: CreateUserOperation,
        timestamp: DateTime<Utc>,
    ) -> DbResult<Vec<UserOperationLogEntry>> {
        let operation_id = new_id();
        let changes = if input.changes.is_empty() {
            vec![None]
        } else {
            input.changes.iter().map(Some).collect()
        };

        let mut entries = Vec::with_capacity(changes.len());
        let mut tx = self.pool.begin().await?;

        for change in changes {
            let entry = UserOperationLogEntry {
                id: new_id(),
                operation_id: operation_id.clone(),
                operation_type: input.operation_type.clone(),
                entity_type: input.entity_type.clone(),
                category: input.category,
                property: change.map(|c| c.property.clone()),
                org_value: change.and_then(|c| c.org_value.clone()),
                new_value: change.and_then(|c| c.new_value.clone()),
                user_id: input.user_id.clone(),
                process_instance_id: input.process_instance_id.clone(),
                root_process_instance_id: input.root_process_instance_id.clone(),
                batch_id: input.batch_id.clone(),
                job_id: input.job_id.clone(),
                timestamp: from_millis(to_millis(timestamp))?,
                removal_time: None,
            };

            sqlx::query(
                r#"
                INSERT INTO hi_op_log (
                    id, operation_id, operation_type, entity_type, category, property,
                    org_value, new_value, user_id, process_instance_id, root_process_instance_id,
                    batch_id, job_id, timestamp, removal_time
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.operation_id)
            .bind(&entry.operation_type)
            .bind(&entry.entity_type)
            .bind(entry.category.as_str())
            .bind(&entry.property)
            .bind(&entry.org_value)
            .bind(&entry.new_value)
            .bind(&entry.user_id)
            .bind(&entry.process_instance_id)
            .bind(&entry.root_process_instance_id)
            .bind(&entry.batch_id)
            .bind(&entry.job_id)
            .bind(to_millis(entry.timestamp))
            .execute(&mut *tx)
            .await?;

            entries.push(entry);
        }

        tx.commit().await?;
        Ok(entries)
    }

    async fn list(&self, query: &UserOperationLogQuery) -> DbResult<Vec<UserOperationLogEntry>> {
        let mut conditions = Vec::new();
        let mut binds: Vec<&str> = Vec::new();

        let filters = [
            ("operation_type", &query.operation_type),
            ("entity_type", &query.entity_type),
            ("user_id", &query.user_id),
            ("batch_id", &query.batch_id),
            ("job_id", &query.job_id),
        ];
        for (column, value) in filters {
            if let Some(value) = value {
                conditions.push(format!("{column} = ?"));
                binds.push(value);
            }
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            r#"
            SELECT id, operation_id, operation_type, entity_type, category, property,
                   org_value, new_value, user_id, process_instance_id, root_process_instance_id,
                   batch_id, job_id, timestamp, removal_time
            FROM hi_op_log
            {filter}
            ORDER BY timestamp ASC, rowid ASC
            "#
        );

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(UserOperationLogEntry {
                    id: row.get("id"),
                    operation_id: row.get("operation_id"),
                    operation_type: row.get("operation_type"),
                    entity_type: row.get("entity_type"),
                    category: parse_column(&row.get::<String, _>("category"))?,
                    property: row.get("property"),
                    org_value: row.get("org_value"),
                    new_value: row.get("new_value"),
                    user_id: row.get("user_id"),
                    process_instance_id: row.get("process_instance_id"),
                    root_process_instance_id: row.get("root_process_instance_id"),
                    batch_id: row.get("batch_id"),
                    job_id: row.get("job_id"),
                    timestamp: from_millis(row.get("timestamp"))?,
                    removal_time: opt_from_millis(row.get("removal_time"))?,
                })
            })
            .collect()
    }
}
