//! Typed views over the remote store's opaque entity documents.
//!
//! The domain entities belong to the application layer; the sync core only
//! needs the handful of fields the consistency checks read and the repairer
//! writes. Deserialization is lenient about extra fields so app-side schema
//! additions do not break auditing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::util::unix_timestamp_ms;

/// A collection as seen by the consistency checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Collection identifier
    pub id: String,
    /// Owning user identifier
    pub owner_id: String,
    /// Display name
    pub name: String,
    /// Cached child item count (derived, may drift)
    #[serde(default)]
    pub stored_count: i64,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub updated_at: i64,
}

impl CollectionRecord {
    /// Create a fresh collection document for the given owner
    #[must_use]
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            stored_count: 0,
            updated_at: unix_timestamp_ms(),
        }
    }

    /// Parse from an opaque remote document
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Serialize back to an opaque remote document
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// An item as seen by the consistency checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Item identifier
    pub id: String,
    /// Owning user identifier
    pub owner_id: String,
    /// Parent collection identifier
    pub collection_id: String,
    /// Display name
    pub name: String,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub updated_at: i64,
}

impl ItemRecord {
    /// Parse from an opaque remote document
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Serialize back to an opaque remote document
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
