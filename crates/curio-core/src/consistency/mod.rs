//! Consistency audit and repair of derived data

mod repairer;
mod validator;

pub use repairer::{ConsistencyRepairer, RECOVERY_BUCKET_LABELS};
pub use validator::ConsistencyValidator;
