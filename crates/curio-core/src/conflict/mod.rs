//! Conflict detection and storage

pub mod detector;
mod store;

pub use detector::{detect, diverges, remote_is_newer, VOLATILE_FIELDS};
pub use store::{ConflictStore, CONFLICTS_KEY};
