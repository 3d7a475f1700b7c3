use serde::{Deserialize, Serialize};

/// Authorization configuration.
///
/// Checks only apply to calls made with an authenticated user. Calls
/// without an authentication (job execution, CLI maintenance) are trusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationConfig {
    /// Enforce grants for authenticated calls.
    #[serde(default)]
    pub enabled: bool,

    /// Users that bypass all checks.
    #[serde(default)]
    pub admin_users: Vec<String>,

    /// Groups whose members bypass all checks.
    #[serde(default)]
    pub admin_groups: Vec<String>,

    /// Allow grants on individual historic process instances and tasks in
    /// addition to grants on their definitions.
    #[serde(default)]
    pub enable_historic_instance_permissions: bool,
}

impl AuthorizationConfig {
    pub fn is_admin(&self, user_id: &str, groups: &[String]) -> bool {
        self.admin_users.iter().any(|u| u == user_id)
            || groups.iter().any(|g| self.admin_groups.contains(g))
    }
}
