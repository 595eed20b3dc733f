use crate::lifecycle::LifecycleStatus;
use crate::registry::{DatasetEntry, ResolvedVia};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload stored in the registry for every served dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDatasetRequest {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    pub data: Value,
}

impl RegisterDatasetRequest {
    /// Trims optional names and drops blank ones.
    pub fn normalized(mut self) -> Self {
        self.identifier = normalize_name(self.identifier);
        self.alias = normalize_name(self.alias);
        self
    }
}

fn normalize_name(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub identifier: String,
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DatasetSummary {
    pub fn from_entry(entry: &DatasetEntry<Dataset>, aliases: Vec<String>) -> Self {
        Self {
            identifier: entry.identifier.clone(),
            aliases,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetResponse {
    #[serde(flatten)]
    pub summary: DatasetSummary,
    pub resolved_via: ResolvedVia,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetList {
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasBinding {
    pub alias: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: LifecycleStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownResponse {
    pub acknowledged: bool,
    pub status: LifecycleStatus,
    pub already_in_progress: bool,
}
