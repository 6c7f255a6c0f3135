//! Persistent byte-blob storage behind the secure key/value store
//!
//! The trait is the seam to whatever the platform offers for durable
//! storage. Values arriving here are already encrypted; implementations
//! only need durability and replace-by-key semantics.

use crate::{Database, Result};
use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;

/// Durable string-keyed blob storage.
pub trait BlobStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Fetch the value under `key`, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Whether `key` is present.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove every entry.
    fn clear(&self) -> Result<()>;
}

/// SQLite-backed blob store over the shared database.
pub struct SqliteBlobStore {
    db: Arc<Database>,
}

impl SqliteBlobStore {
    /// Create a store over `db`.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl BlobStore for SqliteBlobStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO secure_blobs (blob_key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(blob_key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM secure_blobs WHERE blob_key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM secure_blobs WHERE blob_key = ?1", params![key])?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM secure_blobs", [])?;
            Ok(())
        })
    }
}

/// In-memory blob store for tests and the demo harness.
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}
