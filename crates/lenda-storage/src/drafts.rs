//! Loan application drafts
//!
//! Half-finished applications survive restarts in the `drafts` table so a
//! user can resume where they left off. Draft payloads carry applicant
//! answers and are sealed like every other secret.

use crate::cipher::SecretCipher;
use crate::database::Database;
use crate::Result;
use lenda_core::Draft;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// Encrypted storage for in-progress loan applications.
#[derive(Clone)]
pub struct DraftStore {
    db: Arc<Database>,
    cipher: Arc<SecretCipher>,
}

impl DraftStore {
    /// Create a store over `db`, sealing payloads with `cipher`.
    pub fn new(db: Arc<Database>, cipher: Arc<SecretCipher>) -> Self {
        Self { db, cipher }
    }

    /// Insert or update `draft`, keyed by its application id.
    pub fn save(&self, draft: &Draft) -> Result<()> {
        let json = serde_json::to_string(draft)?;
        let sealed = self.cipher.encrypt_str(&json)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO drafts (application_id, user_id, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(application_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![draft.application_id, draft.user_id, sealed, draft.updated_at],
            )?;
            Ok(())
        })
    }

    /// The draft with `application_id` belonging to `user_id`, if any.
    pub fn get(&self, user_id: &str, application_id: &str) -> Result<Option<Draft>> {
        let sealed: Option<String> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT payload FROM drafts
                     WHERE application_id = ?1 AND user_id = ?2",
                    params![application_id, user_id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        let Some(sealed) = sealed else {
            return Ok(None);
        };

        match self.open_draft(&sealed) {
            Ok(draft) => Ok(Some(draft)),
            Err(e) => {
                tracing::warn!(application_id, error = %e, "unreadable draft, dropping");
                self.delete(application_id)?;
                Ok(None)
            }
        }
    }

    /// All drafts for `user_id`, most recently updated first.
    ///
    /// Rows that no longer decrypt are dropped rather than failing the
    /// whole listing.
    pub fn list(&self, user_id: &str) -> Result<Vec<Draft>> {
        let rows: Vec<(String, String)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT application_id, payload FROM drafts
                 WHERE user_id = ?1
                 ORDER BY updated_at DESC",
            )?;
            let rows = stmt
                .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut drafts = Vec::with_capacity(rows.len());
        for (application_id, sealed) in rows {
            match self.open_draft(&sealed) {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    tracing::warn!(application_id, error = %e, "unreadable draft, dropping");
                    self.delete(&application_id)?;
                }
            }
        }
        Ok(drafts)
    }

    /// Remove the draft with `application_id`. Returns whether one existed.
    pub fn delete(&self, application_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM drafts WHERE application_id = ?1",
                params![application_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove every draft belonging to `user_id`. Returns how many.
    pub fn delete_for_user(&self, user_id: &str) -> Result<usize> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM drafts WHERE user_id = ?1", params![user_id])?;
            Ok(changed)
        })
    }

    fn open_draft(&self, sealed: &str) -> Result<Draft> {
        let json = self.cipher.decrypt_str(sealed)?;
        Ok(serde_json::from_str(&json)?)
    }
}
