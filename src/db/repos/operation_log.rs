use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{CreateUserOperation, UserOperationLogEntry, UserOperationLogQuery},
};

#[async_trait]
pub trait OperationLogRepo: Send + Sync {
    /// Write one entry per property change, all sharing a new operation id.
    async fn create(
        &self,
        input: CreateUserOperation,
        timestamp: DateTime<Utc>,
    ) -> DbResult<Vec<UserOperationLogEntry>>;

    async fn list(&self, query: &UserOperationLogQuery) -> DbResult<Vec<UserOperationLogEntry>>;
}
