//! Persisted session token
//!
//! A single encrypted slot holding the active [`AuthToken`]. The token is
//! the whole of the durable session: restoring a session on app start is
//! just reading this slot and checking expiry.

use crate::secure_kv::SecureKeyValueStore;
use crate::{Error, Result};
use lenda_core::AuthToken;

const TOKEN_KEY: &str = "session.auth_token";

/// Durable storage for the signed-in session token.
#[derive(Clone)]
pub struct SessionStore {
    kv: SecureKeyValueStore,
}

impl SessionStore {
    /// Wrap an encrypted key/value store.
    pub fn new(kv: SecureKeyValueStore) -> Self {
        Self { kv }
    }

    /// Persist `token`, replacing any previous one.
    pub fn save_token(&self, token: &AuthToken) -> Result<()> {
        self.kv.put_json(TOKEN_KEY, token)
    }

    /// The stored token, if any.
    pub fn token(&self) -> Result<Option<AuthToken>> {
        self.kv.get_json(TOKEN_KEY)
    }

    /// The user the stored token belongs to, if any.
    pub fn user_id(&self) -> Result<Option<String>> {
        Ok(self.token()?.map(|t| t.user_id))
    }

    /// Replace the refresh token inside the stored session.
    ///
    /// Some rotation endpoints hand back only a new refresh token; the rest
    /// of the session keeps going. Fails if no session is stored.
    pub fn save_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let Some(mut token) = self.token()? else {
            return Err(Error::NotFound("no stored session token".to_string()));
        };
        token.refresh_token = refresh_token.to_string();
        self.save_token(&token)
    }

    /// The refresh token of the stored session, if any.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.token()?.map(|t| t.refresh_token))
    }

    /// Whether a token is stored and not yet expired at `now_ms`.
    pub fn is_valid_at(&self, now_ms: i64) -> Result<bool> {
        Ok(match self.token()? {
            Some(token) => !token.is_expired_at(now_ms),
            None => false,
        })
    }

    /// Whether a token is stored and not yet expired.
    pub fn is_valid(&self) -> Result<bool> {
        Ok(matches!(self.token()?, Some(token) if !token.is_expired()))
    }

    /// Drop the stored token and everything derived from it.
    pub fn clear_all(&self) -> Result<()> {
        self.kv.remove(TOKEN_KEY)
    }
}
