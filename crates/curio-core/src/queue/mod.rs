//! Durable operation queue and its drain state machine

mod processor;
mod store;

pub use processor::QueueProcessor;
pub use store::{OperationStore, QUEUE_KEY};
