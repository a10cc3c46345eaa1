//! Deferred mutation model and its persisted envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::unix_timestamp_ms;

/// Maximum retry attempts before an operation is dropped as a permanent failure
pub const MAX_RETRIES: u32 = 3;

/// Schema version of the persisted queue envelope
pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
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

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of entity an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Collection,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => write!(f, "item"),
            Self::Collection => write!(f, "collection"),
        }
    }
}

/// Kind of deferred mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One deferred mutation awaiting application to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier
    pub id: OperationId,
    /// Mutation kind
    pub op_type: OperationType,
    /// Kind of the target entity
    pub entity_kind: EntityKind,
    /// Target entity identifier
    pub entity_id: String,
    /// Entity snapshot at enqueue time; `None` for deletes
    pub payload: Option<Value>,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Failed attempt count; never exceeds [`MAX_RETRIES`]
    pub retry_count: u32,
    /// Timestamp of the most recent failed attempt (Unix ms)
    pub last_attempt_at: Option<i64>,
    /// Message from the most recent failed attempt
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a new operation with a fresh id and zeroed retry bookkeeping
    #[must_use]
    pub fn new(
        op_type: OperationType,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            entity_kind,
            entity_id: entity_id.into(),
            payload,
            enqueued_at: unix_timestamp_ms(),
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Record a failed attempt without consuming a retry decision
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.retry_count += 1;
        self.last_attempt_at = Some(unix_timestamp_ms());
        self.last_error = Some(message.into());
    }

    /// Whether another retry is permitted
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.retry_count < MAX_RETRIES
    }
}

/// Versioned persistence envelope for the operation queue.
///
/// Operations enqueued by one app version must still drain after an upgrade,
/// so the on-disk format carries an explicit `schema_version` that is checked
/// on load rather than assumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    pub schema_version: u32,
    pub operations: Vec<Operation>,
}

impl QueueEnvelope {
    /// Wrap operations in an envelope at the current schema version
    #[must_use]
    pub const fn new(operations: Vec<Operation>) -> Self {
        Self {
            schema_version: ENVELOPE_SCHEMA_VERSION,
            operations,
        }
    }

    /// Serialize to bytes for the durable local store
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes, rejecting envelopes from incompatible versions
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.schema_version != ENVELOPE_SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                found: envelope.schema_version,
                expected: ENVELOPE_SCHEMA_VERSION,
            });
        }
        Ok(envelope)
    }
}
