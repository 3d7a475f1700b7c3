//! Authorization errors.

use std::fmt;

use thiserror::Error;

use crate::models::{Permission, Resource};

/// One permission a caller needs on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    pub permission: Permission,
    pub resource: Resource,
    /// Specific resource id, or `*` when the grant must cover every resource.
    pub resource_id: String,
}

impl PermissionCheck {
    pub fn new(permission: Permission, resource: Resource, resource_id: impl Into<String>) -> Self {
        Self {
            permission,
            resource,
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for PermissionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' permission on resource '{}' of type '{}'",
            self.permission, self.resource_id, self.resource
        )
    }
}

fn describe_missing(missing: &[PermissionCheck]) -> String {
    match missing {
        [single] => format!("{single}"),
        _ => {
            let parts: Vec<String> = missing.iter().map(ToString::to_string).collect();
            format!("one of the following permissions: {}", parts.join(" or "))
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("The user with id '{user_id}' does not have {}", describe_missing(.missing))]
    AccessDenied {
        user_id: String,
        missing: Vec<PermissionCheck>,
    },

    #[error("The user with id '{user_id}' is not an administrator")]
    AdminRequired { user_id: String },
}

impl AuthzError {
    pub fn access_denied(user_id: impl Into<String>, missing: Vec<PermissionCheck>) -> Self {
        Self::AccessDenied {
            user_id: user_id.into(),
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_user_permission_and_resource() {
        let err = AuthzError::access_denied(
            "demo",
            vec![PermissionCheck::new(
                Permission::DeleteHistory,
                Resource::ProcessDefinition,
                "invoice",
            )],
        );
        assert_eq!(
            err.to_string(),
            "The user with id 'demo' does not have 'DELETE_HISTORY' permission on resource \
             'invoice' of type 'process_definition'"
        );
    }

    #[test]
    fn test_message_lists_alternatives() {
        let err = AuthzError::access_denied(
            "demo",
            vec![
                PermissionCheck::new(Permission::ReadHistory, Resource::ProcessDefinition, "p"),
                PermissionCheck::new(Permission::Read, Resource::HistoricProcessInstance, "pi-1"),
            ],
        );
        let message = err.to_string();
        assert!(message.contains("one of the following permissions"));
        assert!(message.contains("'READ_HISTORY' permission on resource 'p'"));
        assert!(message.contains("of type 'historic_process_instance'"));
    }
}
