//! Queue drain state machine.
//!
//! Drains are strictly sequential: one cooperative worker walks the queue
//! snapshot in enqueue order so causal ordering of writes to the same entity
//! holds without any extra ordering machinery. A second `process_queue` call
//! while one is in flight collapses into a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::conflict::{detect, diverges, remote_is_newer, ConflictStore};
use crate::error::{RemoteError, Result};
use crate::models::{ConflictRecord, Operation, OperationType, SyncResult};
use crate::queue::store::OperationStore;
use crate::store::RemoteStore;
use crate::util::unix_timestamp_ms;

/// Classified outcome of applying one operation remotely
enum Outcome {
    Success,
    Conflict(ConflictRecord),
    Transient(String),
    Permanent(String),
    Invalid(String),
}

/// Releases the single-flight guard on every exit path
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the durable operation queue against the remote store
pub struct QueueProcessor {
    remote: Arc<dyn RemoteStore>,
    operations: OperationStore,
    conflicts: ConflictStore,
    draining: AtomicBool,
}

impl QueueProcessor {
    /// Create a processor over the given collaborators
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        operations: OperationStore,
        conflicts: ConflictStore,
    ) -> Self {
        Self {
            remote,
            operations,
            conflicts,
            draining: AtomicBool::new(false),
        }
    }

    /// Append an operation to the durable queue
    pub async fn enqueue(&self, operation: Operation) -> Result<()> {
        self.operations.enqueue(operation).await
    }

    /// Drain the current queue once.
    ///
    /// Single-flight: an overlapping call returns an empty result without
    /// touching the queue. Operations enqueued while a drain runs are picked
    /// up by the next drain, not spliced into this one.
    pub async fn process_queue(&self) -> Result<SyncResult> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("drain already in flight, skipping");
            return Ok(SyncResult::empty());
        }
        let _guard = DrainGuard(&self.draining);

        let snapshot = self.operations.load().await?;
        let total_operations = snapshot.len();
        let mut success_count = 0;
        let mut failed_count = 0;
        let mut conflict_count = 0;

        tracing::info!(pending = total_operations, "draining operation queue");

        for operation in snapshot {
            match self.apply(&operation).await {
                Outcome::Success => {
                    success_count += 1;
                    self.operations.remove(operation.id).await?;
                }
                Outcome::Conflict(record) => {
                    conflict_count += 1;
                    // resolution is external; the op itself is never retried
                    self.conflicts.record(record).await?;
                    self.operations.remove(operation.id).await?;
                }
                Outcome::Transient(message) => {
                    failed_count += 1;
                    if operation.can_retry() {
                        let mut updated = operation.clone();
                        updated.record_failure(&message);
                        tracing::debug!(
                            op_id = %operation.id,
                            retry_count = updated.retry_count,
                            error = %message,
                            "transient failure, operation retained for retry"
                        );
                        self.operations.update(&updated).await?;
                    } else {
                        tracing::warn!(
                            op_id = %operation.id,
                            entity_id = %operation.entity_id,
                            error = %message,
                            "retries exhausted, dropping operation"
                        );
                        self.operations.remove(operation.id).await?;
                    }
                }
                Outcome::Permanent(message) => {
                    failed_count += 1;
                    tracing::warn!(
                        op_id = %operation.id,
                        entity_id = %operation.entity_id,
                        error = %message,
                        "permanent failure, dropping operation"
                    );
                    self.operations.remove(operation.id).await?;
                }
                Outcome::Invalid(message) => {
                    failed_count += 1;
                    tracing::warn!(
                        op_id = %operation.id,
                        error = %message,
                        "invalid operation payload, dropping operation"
                    );
                    self.operations.remove(operation.id).await?;
                }
            }
        }

        let result = SyncResult {
            total_operations,
            success_count,
            failed_count,
            conflict_count,
            synced_at: unix_timestamp_ms(),
        };
        tracing::info!(
            success = result.success_count,
            failed = result.failed_count,
            conflicts = result.conflict_count,
            "drain complete"
        );
        Ok(result)
    }

    /// Apply one operation remotely and classify the result.
    ///
    /// Queue mutation happens in the caller, only after the outcome here is
    /// known, so a crash mid-drain leaves the persisted queue resumable.
    async fn apply(&self, operation: &Operation) -> Outcome {
        match operation.op_type {
            OperationType::Create => self.apply_create(operation).await,
            OperationType::Update => self.apply_update(operation).await,
            OperationType::Delete => self.apply_delete(operation).await,
        }
    }

    async fn apply_create(&self, operation: &Operation) -> Outcome {
        let Some(payload) = payload_object(operation) else {
            return Outcome::Invalid("create payload missing or not an object".to_string());
        };

        let existing = match self
            .remote
            .get(operation.entity_kind, &operation.entity_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => return classify(error),
        };

        match existing {
            // Entity may already exist when another device synced it first.
            // A field-level match is an idempotent no-op; divergence is a
            // conflict, never a blind overwrite.
            Some(remote) => {
                match detect(operation.entity_kind, &operation.entity_id, payload, &remote) {
                    Some(record) => Outcome::Conflict(record),
                    None => Outcome::Success,
                }
            }
            None => match self
                .remote
                .create(operation.entity_kind, &operation.entity_id, payload)
                .await
            {
                Ok(()) => Outcome::Success,
                Err(error) => classify(error),
            },
        }
    }

    async fn apply_update(&self, operation: &Operation) -> Outcome {
        let Some(payload) = payload_object(operation) else {
            return Outcome::Invalid("update payload missing or not an object".to_string());
        };

        let existing = match self
            .remote
            .get(operation.entity_kind, &operation.entity_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => return classify(error),
        };

        match existing {
            Some(remote) => {
                if !diverges(payload, &remote) {
                    return Outcome::Success;
                }
                // The queued snapshot wins unless the remote copy was touched
                // after it was taken; then both versions are parked for
                // external resolution.
                if remote_is_newer(payload, &remote) {
                    let record = detect(
                        operation.entity_kind,
                        &operation.entity_id,
                        payload,
                        &remote,
                    );
                    if let Some(record) = record {
                        return Outcome::Conflict(record);
                    }
                }
                match self
                    .remote
                    .update(operation.entity_kind, &operation.entity_id, payload)
                    .await
                {
                    Ok(()) => Outcome::Success,
                    Err(error) => classify(error),
                }
            }
            // Deleted remotely or never arrived: upsert so the queue can't
            // wedge on a create/update interleaving from another device.
            None => match self
                .remote
                .create(operation.entity_kind, &operation.entity_id, payload)
                .await
            {
                Ok(()) => Outcome::Success,
                Err(error) => classify(error),
            },
        }
    }

    async fn apply_delete(&self, operation: &Operation) -> Outcome {
        match self
            .remote
            .delete(operation.entity_kind, &operation.entity_id)
            .await
        {
            Ok(()) => Outcome::Success,
            // already gone: deletion is idempotent
            Err(RemoteError::NotFound(_)) => Outcome::Success,
            Err(error) => classify(error),
        }
    }
}

/// Classify a remote error into a drain outcome.
///
/// An unexpected NotFound (entity vanished between get and apply) is treated
/// as transient so the next drain re-evaluates against fresh remote state.
fn classify(error: RemoteError) -> Outcome {
    match error {
        RemoteError::Transient(message) => Outcome::Transient(message),
        RemoteError::Permanent(message) => Outcome::Permanent(message),
        RemoteError::NotFound(message) => {
            Outcome::Transient(format!("entity vanished mid-apply: {message}"))
        }
    }
}

fn payload_object(operation: &Operation) -> Option<&Value> {
    operation.payload.as_ref().filter(|value| value.is_object())
}
