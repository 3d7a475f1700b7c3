use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::{
    ID_CHUNK_SIZE, bind_ids, from_millis, id_chunks, parse_column, placeholders, to_millis,
};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::AuthorizationRepo,
    },
    models::{Authorization, CreateAuthorization, Grantee, Permission, Resource, new_id},
};

pub struct SqliteAuthorizationRepo {
    pool: SqlitePool,
}

impl SqliteAuthorizationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorizationRepo for SqliteAuthorizationRepo {
    async fn create(&self, input: CreateAuthorization) -> DbResult<Authorization> {
        let id = new_id();
        let now = chrono::Utc::now();
        let permissions = Permission::mask(&input.permissions);
        let (user_id, group_id) = match &input.grantee {
            Grantee::User(user) => (Some(user.as_str()), None),
            Grantee::Group(group) => (None, Some(group.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO authorizations (
                id, user_id, group_id, resource_type, resource_id, permissions, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(group_id)
        .bind(input.resource.as_str())
        .bind(&input.resource_id)
        .bind(permissions)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        Ok(Authorization {
            id,
            grantee: input.grantee,
            resource: input.resource,
            resource_id: input.resource_id,
            permissions,
            created_at: from_millis(to_millis(now))?,
        })
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM authorizations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_resource(
        &self,
        resource: Resource,
        resource_ids: &[String],
    ) -> DbResult<u64> {
        if resource_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in id_chunks(resource_ids, ID_CHUNK_SIZE) {
            let sql = format!(
                "DELETE FROM authorizations WHERE resource_type = ? AND resource_id IN ({})",
                placeholders(chunk.len())
            );
            let q = sqlx::query(&sql).bind(resource.as_str());
            deleted += bind_ids(q, &chunk).execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn find_for(
        &self,
        user_id: &str,
        groups: &[String],
        resource: Resource,
    ) -> DbResult<Vec<Authorization>> {
        let group_filter = if groups.is_empty() {
            String::new()
        } else {
            format!("OR group_id IN ({})", placeholders(groups.len()))
        };
        let sql = format!(
            r#"
            SELECT id, user_id, group_id, resource_type, resource_id, permissions, created_at
            FROM authorizations
            WHERE resource_type = ? AND (user_id = ? {group_filter})
            ORDER BY created_at ASC
            "#
        );

        let mut q = sqlx::query(&sql).bind(resource.as_str()).bind(user_id);
        for group in groups {
            q = q.bind(group);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let user: Option<String> = row.get("user_id");
                let group: Option<String> = row.get("group_id");
                let grantee = match (user, group) {
                    (Some(user), _) => Grantee::User(user),
                    (None, Some(group)) => Grantee::Group(group),
                    (None, None) => {
                        return Err(DbError::Internal(
                            "Authorization without user or group".to_string(),
                        ));
                    }
                };
                Ok(Authorization {
                    id: row.get("id"),
                    grantee,
                    resource: parse_column(&row.get::<String, _>("resource_type"))?,
                    resource_id: row.get("resource_id"),
                    permissions: row.get("permissions"),
                    created_at: from_millis(row.get("created_at"))?,
                })
            })
            .collect()
    }
}
