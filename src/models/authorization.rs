use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource id that matches every instance of a resource type.
pub const ANY_RESOURCE_ID: &str = "*";

/// Resource types that grants refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    ProcessDefinition,
    DecisionDefinition,
    CaseDefinition,
    Batch,
    HistoricProcessInstance,
    HistoricTask,
    System,
    Authorization,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::ProcessDefinition => "process_definition",
            Resource::DecisionDefinition => "decision_definition",
            Resource::CaseDefinition => "case_definition",
            Resource::Batch => "batch",
            Resource::HistoricProcessInstance => "historic_process_instance",
            Resource::HistoricTask => "historic_task",
            Resource::System => "system",
            Resource::Authorization => "authorization",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process_definition" => Ok(Resource::ProcessDefinition),
            "decision_definition" => Ok(Resource::DecisionDefinition),
            "case_definition" => Ok(Resource::CaseDefinition),
            "batch" => Ok(Resource::Batch),
            "historic_process_instance" => Ok(Resource::HistoricProcessInstance),
            "historic_task" => Ok(Resource::HistoricTask),
            "system" => Ok(Resource::System),
            "authorization" => Ok(Resource::Authorization),
            _ => Err(format!("Invalid resource: {}", s)),
        }
    }
}

/// Permissions, stored as a bit set on each grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Update,
    Create,
    Delete,
    ReadHistory,
    DeleteHistory,
}

impl Permission {
    pub fn bit(&self) -> i64 {
        match self {
            Permission::Read => 1 << 1,
            Permission::Update => 1 << 2,
            Permission::Create => 1 << 3,
            Permission::Delete => 1 << 4,
            Permission::ReadHistory => 1 << 5,
            Permission::DeleteHistory => 1 << 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Update => "UPDATE",
            Permission::Create => "CREATE",
            Permission::Delete => "DELETE",
            Permission::ReadHistory => "READ_HISTORY",
            Permission::DeleteHistory => "DELETE_HISTORY",
        }
    }

    /// Combine permissions into a bit set.
    pub fn mask(permissions: &[Permission]) -> i64 {
        permissions.iter().fold(0, |acc, p| acc | p.bit())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Grantee {
    User(String),
    Group(String),
}

/// A stored permission grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    pub grantee: Grantee,
    pub resource: Resource,
    /// Specific resource id or `*`.
    pub resource_id: String,
    pub permissions: i64,
    pub created_at: DateTime<Utc>,
}

impl Authorization {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions & permission.bit() != 0
    }
}

/// Input for creating a grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuthorization {
    pub grantee: Grantee,
    pub resource: Resource,
    pub resource_id: String,
    pub permissions: Vec<Permission>,
}

impl CreateAuthorization {
    pub fn user(user_id: impl Into<String>, resource: Resource, resource_id: impl Into<String>) -> Self {
        Self {
            grantee: Grantee::User(user_id.into()),
            resource,
            resource_id: resource_id.into(),
            permissions: Vec::new(),
        }
    }

    pub fn group(group_id: impl Into<String>, resource: Resource, resource_id: impl Into<String>) -> Self {
        Self {
            grantee: Grantee::Group(group_id.into()),
            resource,
            resource_id: resource_id.into(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: &[Permission]) -> Self {
        self.permissions.extend_from_slice(permissions);
        self
    }
}

/// The identity a service call is made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub user_id: String,
    pub groups: Vec<String>,
}

impl Authentication {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}
