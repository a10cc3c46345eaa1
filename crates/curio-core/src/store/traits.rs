//! Collaborator contracts the sync core is built against.
//!
//! The core owns no entity data. It reads and writes application entities
//! through [`RemoteStore`] and persists its own queue/conflict state through
//! [`LocalStore`]. Both are trait objects so callers wire in real backends
//! while tests wire in the in-memory fakes from [`crate::store::memory`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RemoteError, Result};
use crate::models::EntityKind;

/// Remote document store holding the application's entities.
///
/// Per-call read-your-writes consistency is assumed; no cross-call
/// transaction is. Errors arrive pre-classified as [`RemoteError`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create an entity document
    async fn create(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError>;

    /// Replace an entity document
    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError>;

    /// Delete an entity document
    async fn delete(&self, kind: EntityKind, id: &str) -> std::result::Result<(), RemoteError>;

    /// Fetch an entity document, `None` when absent
    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> std::result::Result<Option<Value>, RemoteError>;

    /// Count children referencing the given parent
    async fn count_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<i64, RemoteError>;

    /// List children referencing the given parent
    async fn list_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError>;

    /// List all entities of a kind owned by the given owner
    async fn list_owned(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError>;
}

/// Durable local byte store used to persist queue state across restarts
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Load the bytes stored under `key`, `None` when absent
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Durably store `value` under `key`, replacing any previous value
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;
}
