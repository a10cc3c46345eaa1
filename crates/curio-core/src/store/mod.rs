//! Collaborator contracts and their provided implementations

mod http;
mod libsql;
mod memory;
mod traits;

pub use http::{HttpRemoteStore, RemoteConfig};
pub use self::libsql::LibSqlLocalStore;
pub use memory::{MemoryLocalStore, MemoryRemoteStore};
pub use traits::{LocalStore, RemoteStore};
