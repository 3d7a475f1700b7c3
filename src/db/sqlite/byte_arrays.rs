use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::{from_millis, opt_from_millis, opt_to_millis, parse_column, to_millis};
use crate::{
    db::{error::DbResult, repos::ByteArrayRepo},
    models::ByteArray,
};

pub struct SqliteByteArrayRepo {
    pool: SqlitePool,
}

impl SqliteByteArrayRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ByteArrayRepo for SqliteByteArrayRepo {
    async fn insert(&self, byte_array: &ByteArray) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO byte_arrays (
                id, name, bytes, byte_array_type, root_process_instance_id, batch_id,
                create_time, removal_time
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&byte_array.id)
        .bind(&byte_array.name)
        .bind(&byte_array.bytes)
        .bind(byte_array.byte_array_type.as_str())
        .bind(&byte_array.root_process_instance_id)
        .bind(&byte_array.batch_id)
        .bind(to_millis(byte_array.create_time))
        .bind(opt_to_millis(byte_array.removal_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DbResult<Option<ByteArray>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, bytes, byte_array_type, root_process_instance_id, batch_id,
                   create_time, removal_time
            FROM byte_arrays
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ByteArray {
                id: row.get("id"),
                name: row.get("name"),
                bytes: row.get("bytes"),
                byte_array_type: parse_column(&row.get::<String, _>("byte_array_type"))?,
                root_process_instance_id: row.get("root_process_instance_id"),
                batch_id: row.get("batch_id"),
                create_time: from_millis(row.get("create_time"))?,
                removal_time: opt_from_millis(row.get("removal_time"))?,
            })
        })
        .transpose()
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM byte_arrays WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
