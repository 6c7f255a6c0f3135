//! Durable resource cache
//!
//! One row per cache key holding the encrypted payload of a synced
//! resource and the instant it was last brought in sync. Payloads are
//! sealed with the device key before hitting disk; loan and payment
//! history are as sensitive as anything else we store.

use crate::cipher::SecretCipher;
use crate::database::Database;
use crate::Result;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// A decrypted cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    /// The stored payload, usually JSON.
    pub payload: String,
    /// When the payload was last synced, in epoch milliseconds.
    pub last_synced_at: i64,
}

/// Encrypted cache over the `cache_entries` table.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
    cipher: Arc<SecretCipher>,
}

impl CacheStore {
    /// Create a cache over `db`, sealing payloads with `cipher`.
    pub fn new(db: Arc<Database>, cipher: Arc<SecretCipher>) -> Self {
        Self { db, cipher }
    }

    /// Store `payload` under `key` as synced at `synced_at_ms`.
    pub fn put(&self, key: &str, payload: &str, synced_at_ms: i64) -> Result<()> {
        let sealed = self.cipher.encrypt_str(payload)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (cache_key, payload, last_synced_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(cache_key) DO UPDATE SET
                     payload = excluded.payload,
                     last_synced_at = excluded.last_synced_at",
                params![key, sealed, synced_at_ms],
            )?;
            Ok(())
        })
    }

    /// The row under `key`, decrypted.
    ///
    /// A row that no longer decrypts is removed and reported as absent.
    pub fn get(&self, key: &str) -> Result<Option<CacheRow>> {
        let row: Option<(String, i64)> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT payload, last_synced_at FROM cache_entries WHERE cache_key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        let Some((sealed, last_synced_at)) = row else {
            return Ok(None);
        };

        match self.cipher.decrypt_str(&sealed) {
            Ok(payload) => Ok(Some(CacheRow {
                payload,
                last_synced_at,
            })),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecryptable cache row, dropping");
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    /// Remove the row under `key`. Returns whether a row existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM cache_entries WHERE cache_key = ?1",
                params![key],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove every cached row.
    pub fn clear(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
    }

    /// Remove every row scoped to `user_id`. Returns how many were removed.
    ///
    /// User-scoped keys end in `:<user_id>`, so this leaves shared rows
    /// (product catalogs, form metadata) in place.
    pub fn clear_for_user(&self, user_id: &str) -> Result<usize> {
        let suffix = format!("%:{user_id}");
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM cache_entries WHERE cache_key LIKE ?1",
                params![suffix],
            )?;
            Ok(changed)
        })
    }
}
