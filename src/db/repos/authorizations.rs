use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{Authorization, CreateAuthorization, Resource},
};

#[async_trait]
pub trait AuthorizationRepo: Send + Sync {
    async fn create(&self, input: CreateAuthorization) -> DbResult<Authorization>;

    async fn delete(&self, id: &str) -> DbResult<()>;

    /// Remove every grant on the given resource ids.
    async fn delete_by_resource(&self, resource: Resource, resource_ids: &[String])
    -> DbResult<u64>;

    /// Grants on a resource type held by the user or any of the groups.
    async fn find_for(
        &self,
        user_id: &str,
        groups: &[String],
        resource: Resource,
    ) -> DbResult<Vec<Authorization>>;
}
