use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Resource;

/// Kind of deployed definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Process,
    Decision,
    Case,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DefinitionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(DefinitionKind::Process),
            "decision" => Ok(DefinitionKind::Decision),
            "case" => Ok(DefinitionKind::Case),
            _ => Err(format!("Invalid definition kind: {}", s)),
        }
    }
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Process => "process",
            DefinitionKind::Decision => "decision",
            DefinitionKind::Case => "case",
        }
    }

    /// The resource type grants on definitions of this kind refer to.
    pub fn resource(&self) -> Resource {
        match self {
            DefinitionKind::Process => Resource::ProcessDefinition,
            DefinitionKind::Decision => Resource::DecisionDefinition,
            DefinitionKind::Case => Resource::CaseDefinition,
        }
    }
}

/// A deployed process, decision or case definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: String,
    pub kind: DefinitionKind,
    pub key: String,
    pub name: Option<String>,
    /// Increments per key on each deployment.
    pub version: i32,
    pub deployment_id: String,
    /// Days historic instances are kept after they finish.
    pub history_time_to_live: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Input for deploying a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDefinition {
    pub kind: DefinitionKind,
    pub key: String,
    pub name: Option<String>,
    pub deployment_id: String,
    pub history_time_to_live: Option<i32>,
}

impl CreateDefinition {
    pub fn new(kind: DefinitionKind, key: impl Into<String>, deployment_id: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            name: None,
            deployment_id: deployment_id.into(),
            history_time_to_live: None,
        }
    }

    pub fn with_history_time_to_live(mut self, days: i32) -> Self {
        self.history_time_to_live = Some(days);
        self
    }
}
