// ABOUTME: Defines the revision record, the atomic unit of history for one resource instance.
// ABOUTME: Records are produced by the write path and immutable once appended; this crate only reads them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed attribute mapping carried by insert and update revisions.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// What a revision did to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionAction {
    Insert,
    Update,
    Delete,
}

impl RevisionAction {
    /// The lowercase wire form stored by the revision tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionAction::Insert => "insert",
            RevisionAction::Update => "update",
            RevisionAction::Delete => "delete",
        }
    }
}

impl fmt::Display for RevisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an action string is none of insert/update/delete.
#[derive(Debug, Error)]
#[error("unknown revision action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for RevisionAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(RevisionAction::Insert),
            "update" => Ok(RevisionAction::Update),
            "delete" => Ok(RevisionAction::Delete),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// One historical version of a resource instance.
///
/// `revision_number` starts at 1 and increases per instance. `session_id`
/// is the record's position in the global change ordering; for a fixed
/// (entity_type, natural_id) it is strictly increasing with the revision
/// number. The resolver verifies that invariant on every scan and treats a
/// violation as a data-integrity fault.
///
/// `payload` is present for inserts and updates and absent for deletes.
/// `recorded_at` is the wall-clock append time, carried for audit output;
/// resolution is driven solely by `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub entity_type: String,
    pub natural_id: u64,
    pub revision_number: u32,
    pub session_id: u64,
    pub action: RevisionAction,
    pub payload: Option<Payload>,
    pub recorded_at: DateTime<Utc>,
}
