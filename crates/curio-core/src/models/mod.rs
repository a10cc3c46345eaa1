//! Data models for the sync core

mod conflict;
mod entity;
mod operation;
mod report;

pub use conflict::{ConflictId, ConflictRecord, ResolutionState};
pub use entity::{CollectionRecord, ItemRecord};
pub use operation::{
    EntityKind, Operation, OperationId, OperationType, QueueEnvelope, ENVELOPE_SCHEMA_VERSION,
    MAX_RETRIES,
};
pub use report::{
    ConsistencyReport, CountMismatch, FixResult, OrphanedChild, RelationshipViolation, Severity,
    SyncResult,
};
