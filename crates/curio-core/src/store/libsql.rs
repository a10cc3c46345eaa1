//! libSQL-backed durable local store

use async_trait::async_trait;
use libsql::{params, Builder, Connection, Database};
use std::path::Path;

use crate::error::Result;
use crate::store::traits::LocalStore;
use crate::util::unix_timestamp_ms;

/// Current schema version of the local state database
const CURRENT_VERSION: i32 = 1;

/// Durable key/value store over a local libSQL database.
///
/// Holds the persisted operation queue and conflict records so they survive
/// process restarts.
pub struct LibSqlLocalStore {
    _db: Database,
    conn: Connection,
}

impl LibSqlLocalStore {
    /// Open a local store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let store = Self { _db: db, conn };
        store.configure().await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory local store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let store = Self { _db: db, conn };
        store.configure().await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Configure `SQLite` for durability-friendly defaults
    async fn configure(&self) -> Result<()> {
        // WAL keeps the queue file readable while a drain is persisting
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok(); // not supported for :memory:
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        Ok(())
    }

    /// Run pending schema migrations
    async fn migrate(&self) -> Result<()> {
        let version = self.get_version().await?;

        if version < 1 {
            self.conn
                .execute(
                    "CREATE TABLE IF NOT EXISTS sync_state (
                        key TEXT PRIMARY KEY,
                        value BLOB NOT NULL,
                        updated_at INTEGER NOT NULL
                    )",
                    (),
                )
                .await?;
            self.conn
                .execute(
                    "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
                    (),
                )
                .await?;
            self.conn
                .execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![CURRENT_VERSION],
                )
                .await?;
        }

        Ok(())
    }

    /// Get the current schema version, 0 when the database is fresh
    async fn get_version(&self) -> Result<i32> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                (),
            )
            .await?;

        let exists = if let Some(row) = rows.next().await? {
            row.get::<i32>(0)? != 0
        } else {
            false
        };

        if !exists {
            return Ok(0);
        }

        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
            .await?;

        let version = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };

        Ok(version)
    }
}

#[async_trait]
impl LocalStore for LibSqlLocalStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM sync_state WHERE key = ?",
                params![key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<Vec<u8>>(0)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_state (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value.to_vec(), unix_timestamp_ms()],
            )
            .await?;
        Ok(())
    }
}
