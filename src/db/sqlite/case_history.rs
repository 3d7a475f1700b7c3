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
        repos::{CaseHistoryRepo, CleanupCriteria, DefinitionCounts},
    },
    models::{CaseInstanceState, CleanableCounts, HistoricCaseInstance, HistoricCaseInstanceQuery},
};

pub struct SqliteCaseHistoryRepo {
    pool: SqlitePool,
    id_chunk_size: usize,
}

impl SqliteCaseHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            id_chunk_size: ID_CHUNK_SIZE,
        }
    }

    fn from_row(row: &SqliteRow) -> DbResult<HistoricCaseInstance> {
        Ok(HistoricCaseInstance {
            id: row.get("id"),
            case_definition_id: row.get("case_definition_id"),
            case_definition_key: row.get("case_definition_key"),
            state: parse_column(&row.get::<String, _>("state"))?,
            create_time: from_millis(row.get("create_time"))?,
            close_time: opt_from_millis(row.get("close_time"))?,
            removal_time: opt_from_millis(row.get("removal_time"))?,
        })
    }

    fn cleanable_condition(strategy: CleanupStrategy) -> String {
        match strategy {
            CleanupStrategy::RemovalTimeBased => {
                "ci.removal_time IS NOT NULL AND ci.removal_time <= ?".to_string()
            }
            CleanupStrategy::EndTimeBased => format!(
                "ci.close_time IS NOT NULL AND d.history_time_to_live IS NOT NULL AND {} <= ?",
                plus_days("ci.close_time", "d.history_time_to_live")
            ),
        }
    }

    async fn fetch_case_instances(
        &self,
        query: &HistoricCaseInstanceQuery,
    ) -> DbResult<Vec<HistoricCaseInstance>> {
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
        if let Some(id) = &query.case_definition_id {
            conditions.push("case_definition_id = ?".to_string());
            binds.push(id);
        }
        if let Some(key) = &query.case_definition_key {
            conditions.push("case_definition_key = ?".to_string());
            binds.push(key);
        }
        match query.closed {
            Some(true) => conditions.push("close_time IS NOT NULL".to_string()),
            Some(false) => conditions.push("close_time IS NULL".to_string()),
            None => {}
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = query
            .limit
            .map(|limit| format!("LIMIT {}", limit))
            .unwrap_or_default();
        let sql = format!(
            r#"
            SELECT id, case_definition_id, case_definition_key, state, create_time, close_time,
                   removal_time
            FROM hi_case_instances
            {filter}
            ORDER BY create_time ASC, id ASC
            {limit}
            "#
        );

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[async_trait]
impl CaseHistoryRepo for SqliteCaseHistoryRepo {
    async fn insert_case_instance(&self, instance: &HistoricCaseInstance) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_case_instances (
                id, case_definition_id, case_definition_key, state, create_time, close_time,
                removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.case_definition_id)
        .bind(&instance.case_definition_key)
        .bind(instance.state.as_str())
        .bind(to_millis(instance.create_time))
        .bind(opt_to_millis(instance.close_time))
        .bind(opt_to_millis(instance.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_case_instance(&self, id: &str) -> DbResult<Option<HistoricCaseInstance>> {
        let row = sqlx::query(
            r#"
            SELECT id, case_definition_id, case_definition_key, state, create_time, close_time,
                   removal_time
            FROM hi_case_instances
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_case_instances(
        &self,
        query: &HistoricCaseInstanceQuery,
    ) -> DbResult<Vec<HistoricCaseInstance>> {
        let Some(ids) = query.ids.as_ref().filter(|ids| ids.len() > self.id_chunk_size) else {
            return self.fetch_case_instances(query).await;
        };
        let mut instances = Vec::with_capacity(ids.len());
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let chunk_query = HistoricCaseInstanceQuery {
                ids: Some(chunk),
                limit: None,
                ..query.clone()
            };
            instances.extend(self.fetch_case_instances(&chunk_query).await?);
        }
        instances.sort_by(|a, b| (a.create_time, &a.id).cmp(&(b.create_time, &b.id)));
        if let Some(limit) = query.limit {
            instances.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(instances)
    }

    async fn update_state(
        &self,
        id: &str,
        state: CaseInstanceState,
        close_time: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE hi_case_instances SET state = ?, close_time = COALESCE(?, close_time) WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(opt_to_millis(close_time))
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
        let result = sqlx::query("UPDATE hi_case_instances SET removal_time = ? WHERE id = ?")
            .bind(opt_to_millis(removal_time))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_cascade(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let sql = format!(
                "DELETE FROM hi_case_instances WHERE id IN ({})",
                placeholders(chunk.len())
            );
            deleted += bind_ids(sqlx::query(sql.as_str()), &chunk)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn find_ids_for_cleanup(&self, criteria: &CleanupCriteria) -> DbResult<Vec<String>> {
        let (join, order_column) = match criteria.strategy {
            CleanupStrategy::RemovalTimeBased => ("", "ci.removal_time"),
            CleanupStrategy::EndTimeBased => (
                "JOIN definitions d ON d.id = ci.case_definition_id",
                "ci.close_time",
            ),
        };
        let sql = format!(
            r#"
            SELECT ci.id
            FROM hi_case_instances ci
            {join}
            WHERE {} {}
            ORDER BY {order_column} ASC
            LIMIT ?
            "#,
            Self::cleanable_condition(criteria.strategy),
            minute_filter(order_column, criteria)
        );

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
            SELECT ci.case_definition_id AS definition_id,
                   COALESCE(SUM(CASE WHEN ci.close_time IS NOT NULL THEN 1 ELSE 0 END), 0) AS finished,
                   COALESCE(SUM(CASE WHEN ci.close_time IS NOT NULL AND {} THEN 1 ELSE 0 END), 0) AS cleanable
            FROM hi_case_instances ci
            LEFT JOIN definitions d ON d.id = ci.case_definition_id
            GROUP BY ci.case_definition_id
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
