//! Persisted conflict records awaiting external resolution

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{ConflictId, ConflictRecord, ResolutionState};
use crate::store::LocalStore;

/// Local-store key the conflict envelope is persisted under
pub const CONFLICTS_KEY: &str = "conflict_records";

const CONFLICT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ConflictEnvelope {
    schema_version: u32,
    records: Vec<ConflictRecord>,
}

struct Inner {
    local: Arc<dyn LocalStore>,
    write_lock: Mutex<()>,
}

/// Durable store of conflict records over a [`LocalStore`].
///
/// Records are created only by the queue processor (via the detector) and
/// consumed by an external resolution flow through [`Self::mark_resolved`].
#[derive(Clone)]
pub struct ConflictStore {
    inner: Arc<Inner>,
}

impl ConflictStore {
    /// Create a store persisting through the given local store
    #[must_use]
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                local,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Load all records, resolved ones included
    pub async fn all(&self) -> Result<Vec<ConflictRecord>> {
        match self.inner.local.load(CONFLICTS_KEY).await? {
            Some(bytes) => {
                let envelope: ConflictEnvelope = serde_json::from_slice(&bytes)?;
                if envelope.schema_version != CONFLICT_SCHEMA_VERSION {
                    return Err(Error::SchemaVersion {
                        found: envelope.schema_version,
                        expected: CONFLICT_SCHEMA_VERSION,
                    });
                }
                Ok(envelope.records)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Load records still awaiting resolution
    pub async fn pending(&self) -> Result<Vec<ConflictRecord>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(ConflictRecord::is_pending)
            .collect())
    }

    async fn persist(&self, records: Vec<ConflictRecord>) -> Result<()> {
        let envelope = ConflictEnvelope {
            schema_version: CONFLICT_SCHEMA_VERSION,
            records,
        };
        self.inner
            .local
            .save(CONFLICTS_KEY, &serde_json::to_vec(&envelope)?)
            .await
    }

    /// Append a newly detected conflict
    pub async fn record(&self, record: ConflictRecord) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        let mut records = self.all().await?;
        tracing::warn!(
            entity = %record.entity_kind,
            entity_id = %record.entity_id,
            "recording sync conflict"
        );
        records.push(record);
        self.persist(records).await
    }

    /// Mark a record resolved; returns false when the id is unknown
    pub async fn mark_resolved(&self, id: ConflictId) -> Result<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let mut records = self.all().await?;
        let mut found = false;
        for record in &mut records {
            if record.id == id {
                record.resolution_state = ResolutionState::Resolved;
                found = true;
            }
        }
        if found {
            self.persist(records).await?;
        }
        Ok(found)
    }

    /// Number of records awaiting resolution
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.pending().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use crate::store::{LibSqlLocalStore, MemoryLocalStore};
    use serde_json::json;
    use tempfile::tempdir;

    fn record(entity_id: &str) -> ConflictRecord {
        ConflictRecord::new(
            EntityKind::Item,
            entity_id,
            json!({"name": "local"}),
            json!({"name": "remote"}),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_and_list_pending() {
        let store = ConflictStore::new(Arc::new(MemoryLocalStore::new()));
        store.record(record("i1")).await.unwrap();
        store.record(record("i2")).await.unwrap();

        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_resolved_removes_from_pending() {
        let store = ConflictStore::new(Arc::new(MemoryLocalStore::new()));
        let target = record("i1");
        let target_id = target.id;
        store.record(target).await.unwrap();
        store.record(record("i2")).await.unwrap();

        assert!(store.mark_resolved(target_id).await.unwrap());

        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, "i2");
        // resolved records are retained, not deleted
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_resolved_unknown_id_is_false() {
        let store = ConflictStore::new(Arc::new(MemoryLocalStore::new()));
        assert!(!store.mark_resolved(ConflictId::new()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn records_survive_restart() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("sync.db");

        {
            let local = Arc::new(LibSqlLocalStore::open(&db_path).await.unwrap());
            let store = ConflictStore::new(local);
            store.record(record("i1")).await.unwrap();
        }

        let local = Arc::new(LibSqlLocalStore::open(&db_path).await.unwrap());
        let store = ConflictStore::new(local);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }
}
