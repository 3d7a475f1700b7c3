use async_trait::async_trait;

use crate::{db::error::DbResult, models::ByteArray};

#[async_trait]
pub trait ByteArrayRepo: Send + Sync {
    async fn insert(&self, byte_array: &ByteArray) -> DbResult<()>;

    async fn get(&self, id: &str) -> DbResult<Option<ByteArray>>;

    async fn delete(&self, id: &str) -> DbResult<()>;
}
