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
        error::DbResult,
        repos::{CleanupCriteria, DecisionHistoryRepo, DefinitionCounts},
    },
    models::{
        CleanableCounts, HistoricDecisionInstance, HistoricDecisionInstanceQuery,
        HistoricDecisionValue,
    },
};

const DECISION_INSTANCE_COLUMNS: &str = r#"
    id, decision_definition_id, decision_definition_key, process_instance_id,
    root_process_instance_id, root_decision_instance_id, evaluation_time, removal_time
"#;

pub struct SqliteDecisionHistoryRepo {
    pool: SqlitePool,
    id_chunk_size: usize,
}

impl SqliteDecisionHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            id_chunk_size: ID_CHUNK_SIZE,
        }
    }

    fn decision_instance_from_row(row: &SqliteRow) -> DbResult<HistoricDecisionInstance> {
        Ok(HistoricDecisionInstance {
            id: row.get("id"),
            decision_definition_id: row.get("decision_definition_id"),
            decision_definition_key: row.get("decision_definition_key"),
            process_instance_id: row.get("process_instance_id"),
            root_process_instance_id: row.get("root_process_instance_id"),
            root_decision_instance_id: row.get("root_decision_instance_id"),
            evaluation_time: from_millis(row.get("evaluation_time"))?,
            removal_time: opt_from_millis(row.get("removal_time"))?,
        })
    }

    fn query_filter(query: &HistoricDecisionInstanceQuery) -> (String, Vec<&str>) {
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
        if let Some(id) = &query.decision_definition_id {
            conditions.push("decision_definition_id = ?".to_string());
            binds.push(id);
        }
        if let Some(key) = &query.decision_definition_key {
            conditions.push("decision_definition_key = ?".to_string());
            binds.push(key);
        }
        if let Some(root) = &query.root_decision_instance_id {
            conditions.push("root_decision_instance_id = ?".to_string());
            binds.push(root);
        }
        if let Some(process_instance_id) = &query.process_instance_id {
            conditions.push("process_instance_id = ?".to_string());
            binds.push(process_instance_id);
        }
        if query.roots_only {
            conditions.push("root_decision_instance_id IS NULL".to_string());
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (clause, binds)
    }

    async fn fetch_decision_instances(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> DbResult<Vec<HistoricDecisionInstance>> {
        let (filter, binds) = Self::query_filter(query);
        let limit = query
            .limit
            .map(|limit| format!("LIMIT {}", limit))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {DECISION_INSTANCE_COLUMNS} FROM hi_decision_instances {filter} \
             ORDER BY evaluation_time ASC, id ASC {limit}"
        );

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::decision_instance_from_row).collect()
    }

    async fn count_chunk(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> DbResult<i64> {
        let (filter, binds) = Self::query_filter(query);
        let sql = format!("SELECT COUNT(*) FROM hi_decision_instances {filter}");

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    /// Delete one chunk of decision instances, the decisions they required,
    /// and their values within `tx`.
    async fn delete_chunk(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        ids: &[String],
    ) -> DbResult<u64> {
        let in_list = placeholders(ids.len());
        let scope = format!("di.id IN ({in_list}) OR di.root_decision_instance_id IN ({in_list})");
        let dependents = [
            format!(
                "DELETE FROM byte_arrays WHERE id IN \
                 (SELECT v.byte_array_id FROM hi_decision_values v \
                  JOIN hi_decision_instances di ON di.id = v.decision_instance_id \
                  WHERE {scope})"
            ),
            format!(
                "DELETE FROM hi_decision_values WHERE decision_instance_id IN \
                 (SELECT di.id FROM hi_decision_instances di WHERE {scope})"
            ),
        ];

        for sql in &dependents {
            bind_ids(bind_ids(sqlx::query(sql.as_str()), ids), ids)
                .execute(&mut **tx)
                .await?;
        }
        let sql = format!("DELETE FROM hi_decision_instances AS di WHERE {scope}");
        let result = bind_ids(bind_ids(sqlx::query(sql.as_str()), ids), ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    fn cleanable_condition(strategy: CleanupStrategy) -> String {
        match strategy {
            CleanupStrategy::RemovalTimeBased => {
                "di.removal_time IS NOT NULL AND di.removal_time <= ?".to_string()
            }
            CleanupStrategy::EndTimeBased => format!(
                "d.history_time_to_live IS NOT NULL AND {} <= ?",
                plus_days("di.evaluation_time", "d.history_time_to_live")
            ),
        }
    }

    /// Apply a removal time to the decision instances matching `condition`
    /// (one `?` bound to `id`), their values and value byte arrays.
    async fn set_removal_time_where(
        &self,
        condition: &str,
        binds_per_condition: usize,
        id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        let removal = opt_to_millis(removal_time);
        let statements = [
            format!(
                "UPDATE byte_arrays SET removal_time = ? WHERE id IN \
                 (SELECT v.byte_array_id FROM hi_decision_values v \
                  JOIN hi_decision_instances di ON di.id = v.decision_instance_id \
                  WHERE {condition})"
            ),
            format!(
                "UPDATE hi_decision_values SET removal_time = ? WHERE decision_instance_id IN \
                 (SELECT di.id FROM hi_decision_instances di WHERE {condition})"
            ),
            format!("UPDATE hi_decision_instances AS di SET removal_time = ? WHERE {condition}"),
        ];

        let mut updated = 0;
        let mut tx = self.pool.begin().await?;
        for sql in &statements {
            let mut q = sqlx::query(sql.as_str()).bind(removal);
            for _ in 0..binds_per_condition {
                q = q.bind(id);
            }
            updated += q.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(updated)
    }
}

#[async_trait]
impl DecisionHistoryRepo for SqliteDecisionHistoryRepo {
    async fn insert_decision_instance(&self, instance: &HistoricDecisionInstance) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hi_decision_instances (
                id, decision_definition_id, decision_definition_key, process_instance_id,
                root_process_instance_id, root_decision_instance_id, evaluation_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.decision_definition_id)
        .bind(&instance.decision_definition_key)
        .bind(&instance.process_instance_id)
        .bind(&instance.root_process_instance_id)
        .bind(&instance.root_decision_instance_id)
        .bind(to_millis(instance.evaluation_time))
        .bind(opt_to_millis(instance.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_decision_value(&self, value: &HistoricDecisionValue) -> DbResult<()> {
        let json = value.value.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO hi_decision_values (
                id, decision_instance_id, direction, clause_id, value, byte_array_id,
                root_process_instance_id, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&value.id)
        .bind(&value.decision_instance_id)
        .bind(value.direction.as_str())
        .bind(&value.clause_id)
        .bind(json)
        .bind(&value.byte_array_id)
        .bind(&value.root_process_instance_id)
        .bind(opt_to_millis(value.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_decision_instance(&self, id: &str) -> DbResult<Option<HistoricDecisionInstance>> {
        let sql =
            format!("SELECT {DECISION_INSTANCE_COLUMNS} FROM hi_decision_instances WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decision_instance_from_row).transpose()
    }

    async fn list_decision_instances(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> DbResult<Vec<HistoricDecisionInstance>> {
        let Some(ids) = query.ids.as_ref().filter(|ids| ids.len() > self.id_chunk_size) else {
            return self.fetch_decision_instances(query).await;
        };
        let mut instances = Vec::with_capacity(ids.len());
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let chunk_query = HistoricDecisionInstanceQuery {
                ids: Some(chunk),
                limit: None,
                ..query.clone()
            };
            instances.extend(self.fetch_decision_instances(&chunk_query).await?);
        }
        instances.sort_by(|a, b| (a.evaluation_time, &a.id).cmp(&(b.evaluation_time, &b.id)));
        if let Some(limit) = query.limit {
            instances.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(instances)
    }

    async fn count_decision_instances(
        &self,
        query: &HistoricDecisionInstanceQuery,
    ) -> DbResult<i64> {
        let Some(ids) = query.ids.as_ref().filter(|ids| ids.len() > self.id_chunk_size) else {
            return self.count_chunk(query).await;
        };
        let mut count = 0;
        for chunk in id_chunks(ids, self.id_chunk_size) {
            let chunk_query = HistoricDecisionInstanceQuery {
                ids: Some(chunk),
                ..query.clone()
            };
            count += self.count_chunk(&chunk_query).await?;
        }
        Ok(count)
    }

    async fn list_decision_values(
        &self,
        decision_instance_id: &str,
    ) -> DbResult<Vec<HistoricDecisionValue>> {
        let rows = sqlx::query(
            r#"
            SELECT id, decision_instance_id, direction, clause_id, value, byte_array_id,
                   root_process_instance_id, removal_time
            FROM hi_decision_values
            WHERE decision_instance_id = ?
            ORDER BY direction ASC, clause_id ASC
            "#,
        )
        .bind(decision_instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let value: Option<String> = row.get("value");
                Ok(HistoricDecisionValue {
                    id: row.get("id"),
                    decision_instance_id: row.get("decision_instance_id"),
                    direction: parse_column(&row.get::<String, _>("direction"))?,
                    clause_id: row.get("clause_id"),
                    value: value.as_deref().map(serde_json::from_str).transpose()?,
                    byte_array_id: row.get("byte_array_id"),
                    root_process_instance_id: row.get("root_process_instance_id"),
                    removal_time: opt_from_millis(row.get("removal_time"))?,
                })
            })
            .collect()
    }

    async fn set_removal_time_for_root(
        &self,
        root_decision_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        self.set_removal_time_where(
            "(di.id = ? OR di.root_decision_instance_id = ?)",
            2,
            root_decision_instance_id,
            removal_time,
        )
        .await
    }

    async fn set_removal_time_for_instance(
        &self,
        decision_instance_id: &str,
        removal_time: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        self.set_removal_time_where("di.id = ?", 1, decision_instance_id, removal_time)
            .await
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
        let (join, order_column) = match criteria.strategy {
            CleanupStrategy::RemovalTimeBased => ("", "di.removal_time"),
            CleanupStrategy::EndTimeBased => (
                "JOIN definitions d ON d.id = di.decision_definition_id",
                "di.evaluation_time",
            ),
        };
        let sql = format!(
            r#"
            SELECT di.id
            FROM hi_decision_instances di
            {join}
            WHERE di.root_decision_instance_id IS NULL AND {} {}
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
            SELECT di.decision_definition_id AS definition_id,
                   COUNT(*) AS finished,
                   COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) AS cleanable
            FROM hi_decision_instances di
            LEFT JOIN definitions d ON d.id = di.decision_definition_id
            GROUP BY di.decision_definition_id
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
