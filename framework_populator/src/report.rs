use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use postgres_db::packages::PackageDescriptor;
use serde::{Deserialize, Deserializer, Serialize};

/// Target framework monikers in canonical short form, e.g. `net45`.
pub type FrameworkSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportState {
    Unresolved,
    Resolved,
    Error,
}

impl ReportState {
    pub const ALL: [ReportState; 3] = [
        ReportState::Unresolved,
        ReportState::Resolved,
        ReportState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Unresolved => "Unresolved",
            ReportState::Resolved => "Resolved",
            ReportState::Error => "Error",
        }
    }

    /// Width of the longest state name, for column-aligned output.
    pub fn label_width() -> usize {
        Self::ALL.iter().map(|s| s.as_str().len()).max().unwrap_or(0)
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub framework: String,
    pub applied: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReconciliationOperation {
    pub fn new(kind: OperationKind, framework: String) -> Self {
        ReconciliationOperation {
            kind,
            framework,
            applied: false,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        !self.applied && self.error.is_some()
    }
}

/// The resumable unit of work for one package, persisted as a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub normalized_version: String,
    pub key: i32,
    pub hash: String,
    pub created: DateTime<Utc>,
    #[serde(default, alias = "packageFrameworks")]
    pub declared_frameworks: Option<FrameworkSet>,
    #[serde(default, alias = "databaseFrameworks")]
    pub recorded_frameworks: Option<FrameworkSet>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub operations: Vec<ReconciliationOperation>,
    pub state: ReportState,
    #[serde(default)]
    pub error: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ReconciliationOperation>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ReconciliationOperation>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReconciliationReport {
    pub fn new(package: &PackageDescriptor) -> Self {
        ReconciliationReport {
            id: package.id.clone(),
            version: package.version.clone(),
            normalized_version: package.normalized_version.clone(),
            key: package.key,
            hash: package.hash.clone(),
            created: package.created,
            declared_frameworks: None,
            recorded_frameworks: None,
            operations: vec![],
            state: ReportState::Unresolved,
            error: None,
        }
    }

    /// True once both framework sets are known and the operations were derived from them.
    pub fn has_diff(&self) -> bool {
        self.declared_frameworks.is_some() && self.recorded_frameworks.is_some()
    }

    /// Marks the report as failed before any operation could be computed.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.state = ReportState::Error;
        self.error = Some(error.to_string());
    }

    /// Derives the state from the operations: any failure is an error, all applied
    /// (including none at all) is resolved, anything else is still pending.
    pub fn derive_state(&mut self) {
        self.state = if self.operations.iter().any(|o| o.failed()) {
            ReportState::Error
        } else if self.operations.iter().all(|o| o.applied) {
            ReportState::Resolved
        } else {
            ReportState::Unresolved
        };
    }
}
