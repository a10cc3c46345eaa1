//! Sync conflict record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::operation::EntityKind;
use crate::util::unix_timestamp_ms;

/// A unique identifier for a conflict record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a conflict record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    /// Awaiting external resolution
    Pending,
    /// Resolved by the external resolution flow
    Resolved,
}

/// Recorded divergence between a queued local snapshot and the remote copy.
///
/// Both snapshots are retained verbatim; no merge is attempted. Resolution is
/// driven externally via [`crate::conflict::ConflictStore::mark_resolved`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict record identifier
    pub id: ConflictId,
    /// Kind of the conflicted entity
    pub entity_kind: EntityKind,
    /// Conflicted entity identifier
    pub entity_id: String,
    /// Local snapshot as enqueued
    pub local_snapshot: Value,
    /// Remote snapshot at detection time
    pub remote_snapshot: Value,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Current resolution state
    pub resolution_state: ResolutionState,
}

impl ConflictRecord {
    /// Create a pending conflict record for a detected divergence
    #[must_use]
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        local_snapshot: Value,
        remote_snapshot: Value,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            entity_kind,
            entity_id: entity_id.into(),
            local_snapshot,
            remote_snapshot,
            detected_at: unix_timestamp_ms(),
            resolution_state: ResolutionState::Pending,
        }
    }

    /// Whether this record still awaits resolution
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.resolution_state, ResolutionState::Pending)
    }
}
