//! Durable FIFO persistence for the operation queue.
//!
//! The queue lives in the durable local store as one versioned envelope.
//! Only two writers exist: `enqueue` (append) and the queue processor
//! (remove on terminal outcome, update in place on retryable failure).
//! Nothing else may reorder or delete entries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Operation, OperationId, OperationType, QueueEnvelope};
use crate::store::LocalStore;

/// Local-store key the queue envelope is persisted under
pub const QUEUE_KEY: &str = "operation_queue";

struct Inner {
    local: Arc<dyn LocalStore>,
    // serializes read-modify-write cycles against the local store
    write_lock: Mutex<()>,
}

/// Durable operation queue over a [`LocalStore`]
#[derive(Clone)]
pub struct OperationStore {
    inner: Arc<Inner>,
}

impl OperationStore {
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

    /// Load the current queue in enqueue order; empty when nothing persisted
    pub async fn load(&self) -> Result<Vec<Operation>> {
        match self.inner.local.load(QUEUE_KEY).await? {
            Some(bytes) => Ok(QueueEnvelope::from_bytes(&bytes)?.operations),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, operations: Vec<Operation>) -> Result<()> {
        let envelope = QueueEnvelope::new(operations);
        self.inner.local.save(QUEUE_KEY, &envelope.to_bytes()?).await
    }

    /// Append an operation to the tail of the queue
    pub async fn enqueue(&self, operation: Operation) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        let mut operations = self.load().await?;
        tracing::debug!(
            op_id = %operation.id,
            op_type = %operation.op_type,
            entity = %operation.entity_kind,
            "enqueueing operation"
        );
        operations.push(operation);
        self.persist(operations).await
    }

    /// Remove an operation after a terminal outcome
    pub async fn remove(&self, id: OperationId) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        let mut operations = self.load().await?;
        operations.retain(|op| op.id != id);
        self.persist(operations).await
    }

    /// Update an operation's retry bookkeeping in place
    pub async fn update(&self, updated: &Operation) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        let mut operations = self.load().await?;
        for op in &mut operations {
            if op.id == updated.id {
                *op = updated.clone();
            }
        }
        self.persist(operations).await
    }

    /// Number of pending operations
    pub async fn depth(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    /// Pending operation counts grouped by mutation type
    pub async fn counts_by_type(&self) -> Result<HashMap<OperationType, usize>> {
        let mut counts = HashMap::new();
        for op in self.load().await? {
            *counts.entry(op.op_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Drop all pending operations. Diagnostics only.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        tracing::warn!("clearing operation queue");
        self.persist(Vec::new()).await
    }
}
