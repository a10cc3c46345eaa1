//! In-memory collaborator implementations.
//!
//! Used by tests and local demos the same way the libSQL store offers
//! `open_in_memory`. The remote fake supports failure injection so drain
//! retry and repair-failure paths can be exercised deterministically.

#![allow(clippy::cast_possible_wrap)] // child counts fit comfortably in i64

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{RemoteError, Result};
use crate::models::EntityKind;
use crate::store::traits::{LocalStore, RemoteStore};

/// Injected failure behavior for [`MemoryRemoteStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// All calls succeed
    None,
    /// Fail transiently; `remaining == None` means fail forever
    Transient { remaining: Option<u32> },
    /// Fail permanently on every call
    Permanent,
}

/// In-memory remote document store with failure injection
pub struct MemoryRemoteStore {
    entities: Mutex<HashMap<(EntityKind, String), Value>>,
    failure: Mutex<FailureMode>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemoteStore {
    /// Create an empty store with no injected failures
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            failure: Mutex::new(FailureMode::None),
            latency: Mutex::new(None),
        }
    }

    /// Seed an entity document directly, bypassing failure injection
    pub async fn seed(&self, kind: EntityKind, id: impl Into<String>, data: Value) {
        self.entities.lock().await.insert((kind, id.into()), data);
    }

    /// Read an entity document directly, bypassing failure injection
    pub async fn entity(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.entities.lock().await.get(&(kind, id.to_string())).cloned()
    }

    /// Number of stored entities of the given kind
    pub async fn count_of_kind(&self, kind: EntityKind) -> usize {
        self.entities
            .lock()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Make every call fail transiently until [`Self::heal`] is called
    pub async fn fail_transiently(&self) {
        *self.failure.lock().await = FailureMode::Transient { remaining: None };
    }

    /// Make the next `count` calls fail transiently, then succeed
    pub async fn fail_transiently_times(&self, count: u32) {
        *self.failure.lock().await = FailureMode::Transient {
            remaining: Some(count),
        };
    }

    /// Make every call fail permanently until [`Self::heal`] is called
    pub async fn fail_permanently(&self) {
        *self.failure.lock().await = FailureMode::Permanent;
    }

    /// Clear any injected failure
    pub async fn heal(&self) {
        *self.failure.lock().await = FailureMode::None;
    }

    /// Add artificial latency to every call
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = Some(latency);
    }

    /// Apply injected latency and failure, in that order
    async fn checkpoint(&self) -> std::result::Result<(), RemoteError> {
        let latency = *self.latency.lock().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut failure = self.failure.lock().await;
        match *failure {
            FailureMode::None => Ok(()),
            FailureMode::Permanent => Err(RemoteError::Permanent(
                "injected permanent failure".to_string(),
            )),
            FailureMode::Transient { remaining } => {
                if let Some(count) = remaining {
                    if count == 0 {
                        *failure = FailureMode::None;
                        return Ok(());
                    }
                    *failure = FailureMode::Transient {
                        remaining: Some(count - 1),
                    };
                }
                Err(RemoteError::Transient(
                    "injected transient failure".to_string(),
                ))
            }
        }
    }

    /// Parent reference field for a child of the given parent kind
    const fn parent_field(parent_kind: EntityKind) -> &'static str {
        match parent_kind {
            EntityKind::Collection => "collection_id",
            // Items have no children; matched for contract completeness
            EntityKind::Item => "item_id",
        }
    }

    /// Child kind for a given parent kind
    const fn child_kind(parent_kind: EntityKind) -> EntityKind {
        match parent_kind {
            EntityKind::Collection => EntityKind::Item,
            EntityKind::Item => EntityKind::Item,
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError> {
        self.checkpoint().await?;
        let mut entities = self.entities.lock().await;
        if entities.contains_key(&(kind, id.to_string())) {
            // mirrors the HTTP store's 409: retryable so the next drain
            // re-reads the winner and routes through conflict detection
            return Err(RemoteError::Transient(format!(
                "{kind} {id} already exists"
            )));
        }
        entities.insert((kind, id.to_string()), data.clone());
        Ok(())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        data: &Value,
    ) -> std::result::Result<(), RemoteError> {
        self.checkpoint().await?;
        let mut entities = self.entities.lock().await;
        match entities.get_mut(&(kind, id.to_string())) {
            Some(existing) => {
                *existing = data.clone();
                Ok(())
            }
            None => Err(RemoteError::NotFound(format!("{kind} {id}"))),
        }
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> std::result::Result<(), RemoteError> {
        self.checkpoint().await?;
        let mut entities = self.entities.lock().await;
        match entities.remove(&(kind, id.to_string())) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("{kind} {id}"))),
        }
    }

    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> std::result::Result<Option<Value>, RemoteError> {
        self.checkpoint().await?;
        Ok(self.entities.lock().await.get(&(kind, id.to_string())).cloned())
    }

    async fn count_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<i64, RemoteError> {
        let children = self.list_children(parent_kind, parent_id).await?;
        Ok(children.len() as i64)
    }

    async fn list_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError> {
        self.checkpoint().await?;
        let field = Self::parent_field(parent_kind);
        let child_kind = Self::child_kind(parent_kind);
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|((kind, _), value)| {
                *kind == child_kind && value.get(field).and_then(Value::as_str) == Some(parent_id)
            })
            .map(|(_, value)| value.clone())
            .collect())
    }

    async fn list_owned(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> std::result::Result<Vec<Value>, RemoteError> {
        self.checkpoint().await?;
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|((k, _), value)| {
                *k == kind && value.get("owner_id").and_then(Value::as_str) == Some(owner_id)
            })
            .map(|(_, value)| value.clone())
            .collect())
    }
}

/// In-memory durable local store
#[derive(Default)]
pub struct MemoryLocalStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryLocalStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
