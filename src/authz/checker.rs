use std::sync::Arc;

use super::{AuthzError, PermissionCheck};
use crate::{
    config::AuthorizationConfig,
    db::repos::AuthorizationRepo,
    error::EngineResult,
    models::{ANY_RESOURCE_ID, Authentication, Authorization, Permission, Resource},
};

/// Evaluates permission checks against the stored grants.
pub struct AuthorizationChecker {
    config: AuthorizationConfig,
    repo: Arc<dyn AuthorizationRepo>,
}

impl AuthorizationChecker {
    pub fn new(config: AuthorizationConfig, repo: Arc<dyn AuthorizationRepo>) -> Self {
        Self { config, repo }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn historic_instance_permissions_enabled(&self) -> bool {
        self.config.enable_historic_instance_permissions
    }

    /// Returns the authentication to check, or `None` when checks are skipped.
    fn subject<'a>(&self, auth: Option<&'a Authentication>) -> Option<&'a Authentication> {
        if !self.config.enabled {
            return None;
        }
        auth.filter(|a| !self.config.is_admin(&a.user_id, &a.groups))
    }

    /// Fail unless the caller is an admin or checks are skipped.
    pub fn check_admin(&self, auth: Option<&Authentication>) -> EngineResult<()> {
        match self.subject(auth) {
            None => Ok(()),
            Some(auth) => {
                tracing::debug!(user_id = %auth.user_id, "Admin check failed");
                Err(AuthzError::AdminRequired {
                    user_id: auth.user_id.clone(),
                }
                .into())
            }
        }
    }

    pub async fn check(
        &self,
        auth: Option<&Authentication>,
        check: PermissionCheck,
    ) -> EngineResult<()> {
        self.check_any(auth, vec![check]).await
    }

    /// Pass when at least one of the checks is granted.
    pub async fn check_any(
        &self,
        auth: Option<&Authentication>,
        checks: Vec<PermissionCheck>,
    ) -> EngineResult<()> {
        let Some(subject) = self.subject(auth) else {
            return Ok(());
        };
        if self.any_granted(subject, &checks).await? {
            return Ok(());
        }

        tracing::debug!(
            user_id = %subject.user_id,
            checks = checks.len(),
            "Authorization check failed"
        );
        Err(AuthzError::access_denied(subject.user_id.clone(), checks).into())
    }

    /// Like [`check_any`](Self::check_any) but returns the outcome instead
    /// of failing.
    pub async fn is_granted_any(
        &self,
        auth: Option<&Authentication>,
        checks: &[PermissionCheck],
    ) -> EngineResult<bool> {
        match self.subject(auth) {
            None => Ok(true),
            Some(subject) => self.any_granted(subject, checks).await,
        }
    }

    /// Whether a user holds a permission on a resource. Without a resource
    /// id only grants on `*` count. Admin and enablement settings are ignored.
    pub async fn is_user_authorized(
        &self,
        user_id: &str,
        groups: &[String],
        permission: Permission,
        resource: Resource,
        resource_id: Option<&str>,
    ) -> EngineResult<bool> {
        let grants = self.repo.find_for(user_id, groups, resource).await?;
        let resource_id = resource_id.unwrap_or(ANY_RESOURCE_ID);
        Ok(grants
            .iter()
            .any(|grant| grant_covers(grant, permission, resource_id)))
    }

    async fn any_granted(
        &self,
        subject: &Authentication,
        checks: &[PermissionCheck],
    ) -> EngineResult<bool> {
        let mut loaded: Vec<(Resource, Vec<Authorization>)> = Vec::new();
        for check in checks {
            let position = loaded.iter().position(|(r, _)| *r == check.resource);
            let index = match position {
                Some(index) => index,
                None => {
                    let grants = self
                        .repo
                        .find_for(&subject.user_id, &subject.groups, check.resource)
                        .await?;
                    loaded.push((check.resource, grants));
                    loaded.len() - 1
                }
            };
            if loaded[index]
                .1
                .iter()
                .any(|grant| grant_covers(grant, check.permission, &check.resource_id))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Checks for common operations
    // ========================================================================

    /// Reading the history of a process instance: `READ_HISTORY` on its
    /// definition, or `READ` on the instance itself when historic instance
    /// permissions are enabled.
    pub fn read_historic_process_instance(
        &self,
        definition_key: &str,
        process_instance_id: &str,
    ) -> Vec<PermissionCheck> {
        let mut checks = vec![PermissionCheck::new(
            Permission::ReadHistory,
            Resource::ProcessDefinition,
            definition_key,
        )];
        if self.historic_instance_permissions_enabled() {
            checks.push(PermissionCheck::new(
                Permission::Read,
                Resource::HistoricProcessInstance,
                process_instance_id,
            ));
        }
        checks
    }

    /// Reading a historic task: `READ_HISTORY` on the process definition, or
    /// `READ` on the task when historic instance permissions are enabled.
    pub fn read_historic_task(&self, definition_key: &str, task_id: &str) -> Vec<PermissionCheck> {
        let mut checks = vec![PermissionCheck::new(
            Permission::ReadHistory,
            Resource::ProcessDefinition,
            definition_key,
        )];
        if self.historic_instance_permissions_enabled() {
            checks.push(PermissionCheck::new(
                Permission::Read,
                Resource::HistoricTask,
                task_id,
            ));
        }
        checks
    }

    /// Cleanable reports need both `READ` and `READ_HISTORY` on a definition.
    pub async fn can_read_definition_report(
        &self,
        auth: Option<&Authentication>,
        resource: Resource,
        definition_key: &str,
    ) -> EngineResult<bool> {
        for permission in [Permission::Read, Permission::ReadHistory] {
            let check = PermissionCheck::new(permission, resource, definition_key);
            if !self.is_granted_any(auth, std::slice::from_ref(&check)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn grant_covers(grant: &Authorization, permission: Permission, resource_id: &str) -> bool {
    grant.has_permission(permission)
        && (grant.resource_id == ANY_RESOURCE_ID || grant.resource_id == resource_id)
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::{
        db::{DbPool, tests::harness::create_test_db},
        error::EngineError,
        models::CreateAuthorization,
    };

    fn config(enabled: bool, historic_instances: bool) -> AuthorizationConfig {
        AuthorizationConfig {
            enabled,
            admin_users: vec!["admin".to_string()],
            admin_groups: vec!["operators".to_string()],
            enable_historic_instance_permissions: historic_instances,
        }
    }

    fn checker(db: &DbPool, enabled: bool, historic_instances: bool) -> AuthorizationChecker {
        AuthorizationChecker::new(config(enabled, historic_instances), db.authorizations())
    }

    fn delete_history(key: &str) -> PermissionCheck {
        PermissionCheck::new(Permission::DeleteHistory, Resource::ProcessDefinition, key)
    }

    #[tokio::test]
    async fn test_disabled_or_unauthenticated_calls_pass() {
        let db = create_test_db().await;
        let demo = Authentication::new("demo");

        let disabled = checker(&db, false, false);
        assert!(disabled.check(Some(&demo), delete_history("p")).await.is_ok());

        let enabled = checker(&db, true, false);
        assert!(enabled.check(None, delete_history("p")).await.is_ok());
        assert!(enabled.check_admin(None).is_ok());
    }

    #[tokio::test]
    async fn test_admins_bypass_checks() {
        let db = create_test_db().await;
        let checker = checker(&db, true, false);

        let admin = Authentication::new("admin");
        let operator = Authentication::new("jane").with_groups(["operators"]);
        assert!(checker.check(Some(&admin), delete_history("p")).await.is_ok());
        assert!(checker.check(Some(&operator), delete_history("p")).await.is_ok());
        assert!(checker.check_admin(Some(&operator)).is_ok());

        let demo = Authentication::new("demo");
        assert!(matches!(
            checker.check_admin(Some(&demo)),
            Err(EngineError::Forbidden(AuthzError::AdminRequired { .. }))
        ));
    }

    #[tokio::test]
    async fn test_denied_without_grant() {
        let db = create_test_db().await;
        let checker = checker(&db, true, false);
        let demo = Authentication::new("demo");

        let err = checker
            .check(Some(&demo), delete_history("invoice"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("demo"));
        assert!(message.contains("DELETE_HISTORY"));
        assert!(message.contains("invoice"));
        assert!(message.contains("process_definition"));
    }

    #[tokio::test]
    async fn test_grant_on_specific_and_any_resource() {
        let db = create_test_db().await;
        let checker = checker(&db, true, false);
        let demo = Authentication::new("demo");

        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::ProcessDefinition, "invoice")
                    .with_permissions(&[Permission::DeleteHistory]),
            )
            .await
            .unwrap();
        assert!(checker.check(Some(&demo), delete_history("invoice")).await.is_ok());
        assert!(checker.check(Some(&demo), delete_history("other")).await.is_err());

        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::ProcessDefinition, ANY_RESOURCE_ID)
                    .with_permissions(&[Permission::DeleteHistory]),
            )
            .await
            .unwrap();
        assert!(checker.check(Some(&demo), delete_history("other")).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_grant() {
        let db = create_test_db().await;
        let checker = checker(&db, true, false);

        db.authorizations()
            .create(
                CreateAuthorization::group("sales", Resource::Batch, ANY_RESOURCE_ID)
                    .with_permissions(&[Permission::Create]),
            )
            .await
            .unwrap();

        let create_batch = PermissionCheck::new(Permission::Create, Resource::Batch, "*");
        let member = Authentication::new("jane").with_groups(["sales"]);
        let outsider = Authentication::new("joe");
        assert!(checker.check(Some(&member), create_batch.clone()).await.is_ok());
        assert!(checker.check(Some(&outsider), create_batch).await.is_err());
    }

    #[tokio::test]
    async fn test_historic_instance_permissions_only_when_enabled() {
        let db = create_test_db().await;
        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::HistoricProcessInstance, "pi-1")
                    .with_permissions(&[Permission::Read]),
            )
            .await
            .unwrap();
        let demo = Authentication::new("demo");

        let without = checker(&db, true, false);
        let checks = without.read_historic_process_instance("invoice", "pi-1");
        assert_eq!(checks.len(), 1);
        assert!(!without.is_granted_any(Some(&demo), &checks).await.unwrap());

        let with = checker(&db, true, true);
        let checks = with.read_historic_process_instance("invoice", "pi-1");
        assert_eq!(checks.len(), 2);
        assert!(with.is_granted_any(Some(&demo), &checks).await.unwrap());
        let other = with.read_historic_process_instance("invoice", "pi-2");
        assert!(!with.is_granted_any(Some(&demo), &other).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_user_authorized_without_resource_id_needs_any_grant() {
        let db = create_test_db().await;
        let checker = checker(&db, true, true);

        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::HistoricTask, "task-1")
                    .with_permissions(&[Permission::Read]),
            )
            .await
            .unwrap();

        assert!(
            !checker
                .is_user_authorized("demo", &[], Permission::Read, Resource::HistoricTask, None)
                .await
                .unwrap()
        );
        assert!(
            checker
                .is_user_authorized(
                    "demo",
                    &[],
                    Permission::Read,
                    Resource::HistoricTask,
                    Some("task-1")
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_definition_report_needs_read_and_read_history() {
        let db = create_test_db().await;
        let checker = checker(&db, true, false);
        let demo = Authentication::new("demo");

        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::ProcessDefinition, "invoice")
                    .with_permissions(&[Permission::Read]),
            )
            .await
            .unwrap();
        assert!(
            !checker
                .can_read_definition_report(Some(&demo), Resource::ProcessDefinition, "invoice")
                .await
                .unwrap()
        );

        db.authorizations()
            .create(
                CreateAuthorization::user("demo", Resource::ProcessDefinition, "invoice")
                    .with_permissions(&[Permission::ReadHistory]),
            )
            .await
            .unwrap();
        assert!(
            checker
                .can_read_definition_report(Some(&demo), Resource::ProcessDefinition, "invoice")
                .await
                .unwrap()
        );
    }
}
