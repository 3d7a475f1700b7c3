use serde::{Deserialize, Serialize};

/// Cleanable history of one process, decision or case definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanableDefinitionReport {
    pub definition_id: String,
    pub definition_key: String,
    pub definition_name: Option<String>,
    pub definition_version: i32,
    pub history_time_to_live: Option<i32>,
    /// Finished instances of the definition.
    pub finished_count: i64,
    /// Finished instances already due for cleanup.
    pub cleanable_count: i64,
}

/// Cleanable history of one batch type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanableBatchReport {
    pub batch_type: String,
    pub history_time_to_live: Option<i32>,
    pub finished_count: i64,
    pub cleanable_count: i64,
}

/// Filter for the definition reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanableReportQuery {
    pub definition_ids: Option<Vec<String>>,
    pub definition_keys: Option<Vec<String>>,
    /// Drop rows without finished or cleanable instances.
    pub compact: bool,
}

/// Raw counts per definition or batch type, as returned by the repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanableCounts {
    pub finished: i64,
    pub cleanable: i64,
}
