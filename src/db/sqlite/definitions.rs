use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{from_millis, parse_column, to_millis};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DefinitionRepo,
    },
    models::{CreateDefinition, Definition, DefinitionKind, new_id},
};

pub struct SqliteDefinitionRepo {
    pool: SqlitePool,
}

impl SqliteDefinitionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> DbResult<Definition> {
        Ok(Definition {
            id: row.get("id"),
            kind: parse_column(&row.get::<String, _>("kind"))?,
            key: row.get("definition_key"),
            name: row.get("name"),
            version: row.get("version"),
            deployment_id: row.get("deployment_id"),
            history_time_to_live: row.get("history_time_to_live"),
            created_at: from_millis(row.get("created_at"))?,
        })
    }
}

#[async_trait]
impl DefinitionRepo for SqliteDefinitionRepo {
    async fn create(&self, input: CreateDefinition) -> DbResult<Definition> {
        let id = new_id();
        let now = chrono::Utc::now();

        let mut tx = self.pool.begin().await?;

        let latest: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(version), 0)
            FROM definitions
            WHERE kind = ? AND definition_key = ?
            "#,
        )
        .bind(input.kind.as_str())
        .bind(&input.key)
        .fetch_one(&mut *tx)
        .await?;

        let version = latest + 1;

        sqlx::query(
            r#"
            INSERT INTO definitions (
                id, kind, definition_key, name, version, deployment_id,
                history_time_to_live, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.kind.as_str())
        .bind(&input.key)
        .bind(&input.name)
        .bind(version)
        .bind(&input.deployment_id)
        .bind(input.history_time_to_live)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("Definition '{}' version {} already exists", input.key, version),
            ),
            _ => DbError::from(e),
        })?;

        tx.commit().await?;

        Ok(Definition {
            id,
            kind: input.kind,
            key: input.key,
            name: input.name,
            version,
            deployment_id: input.deployment_id,
            history_time_to_live: input.history_time_to_live,
            created_at: from_millis(to_millis(now))?,
        })
    }

    async fn get(&self, id: &str) -> DbResult<Option<Definition>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, definition_key, name, version, deployment_id,
                   history_time_to_live, created_at
            FROM definitions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_latest_by_key(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> DbResult<Option<Definition>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, definition_key, name, version, deployment_id,
                   history_time_to_live, created_at
            FROM definitions
            WHERE kind = ? AND definition_key = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self, kind: DefinitionKind) -> DbResult<Vec<Definition>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, definition_key, name, version, deployment_id,
                   history_time_to_live, created_at
            FROM definitions
            WHERE kind = ?
            ORDER BY definition_key ASC, version ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn update_history_time_to_live(&self, id: &str, days: Option<i32>) -> DbResult<()> {
        let result = sqlx::query("UPDATE definitions SET history_time_to_live = ? WHERE id = ?")
            .bind(days)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
