//! curio-core - Offline-first sync engine for Curio
//!
//! Keeps the collection tracker usable while disconnected: mutations are
//! recorded in a durable operation queue, replayed against the remote store
//! when connectivity returns, and divergent replays are parked as conflict
//! records. A separate validator/repairer audits derived data (cached child
//! counts, parent references) that can drift across devices.

pub mod conflict;
pub mod consistency;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod queue;
pub mod store;
pub mod util;

pub use coordinator::{SyncContext, SyncCoordinator};
pub use error::{Error, RemoteError, Result};
pub use models::{
    ConflictRecord, ConsistencyReport, EntityKind, FixResult, Operation, OperationId,
    OperationType, SyncResult,
};
