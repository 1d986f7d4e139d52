use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Category of a queued write. Each kind maps to exactly one remote destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Safety incident report
    Incident,
    /// Completed checklist
    Checklist,
    /// PPE inspection result
    Inspection,
    /// Audit or compliance report
    Report,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Incident,
        RecordKind::Checklist,
        RecordKind::Inspection,
        RecordKind::Report,
    ];

    /// Remote table that receives records of this kind on sync
    pub fn destination(self) -> Destination {
        match self {
            RecordKind::Incident => Destination("incidents"),
            RecordKind::Checklist => Destination("checklists"),
            RecordKind::Inspection => Destination("ppe_inspections"),
            RecordKind::Report => Destination("reports"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Incident => "incident",
            RecordKind::Checklist => "checklist",
            RecordKind::Inspection => "inspection",
            RecordKind::Report => "report",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown record kind '{}'", s))
    }
}

/// Name of a remote table/collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination(&'static str);

impl Destination {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Opaque record identifier, generated at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A pending write held in the local durable queue.
///
/// Records are append-only: once created, only `synced` ever changes, and
/// only from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(rename = "data")]
    pub payload: Value,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}

impl QueueRecord {
    pub fn new(kind: RecordKind, payload: Value) -> Self {
        Self {
            id: RecordId::generate(),
            kind,
            payload,
            created_at: Utc::now(),
            synced: false,
        }
    }
}
