use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CleanableCounts, CreateDefinition, Definition, DefinitionKind},
};

#[async_trait]
pub trait DefinitionRepo: Send + Sync {
    /// Deploy a definition. The version is one higher than the latest
    /// version deployed with the same kind and key.
    async fn create(&self, input: CreateDefinition) -> DbResult<Definition>;

    async fn get(&self, id: &str) -> DbResult<Option<Definition>>;

    /// Latest version of a definition key.
    async fn get_latest_by_key(&self, kind: DefinitionKind, key: &str)
    -> DbResult<Option<Definition>>;

    /// All definitions of a kind, ordered by key and version.
    async fn list(&self, kind: DefinitionKind) -> DbResult<Vec<Definition>>;

    async fn update_history_time_to_live(&self, id: &str, days: Option<i32>) -> DbResult<()>;
}

/// Finished and cleanable instance counts of one definition.
pub type DefinitionCounts = (String, CleanableCounts);
