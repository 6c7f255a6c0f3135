//! Cached user profile
//!
//! The signed-in user's profile lives in the encrypted store (it carries
//! PII) wrapped in a [`CachedResource`] so callers can reason about its
//! freshness the same way they do for other synced data.

use crate::secure_kv::SecureKeyValueStore;
use crate::Result;
use lenda_core::{CachedResource, UserProfile};

const PROFILE_KEY: &str = "profile.cached";

/// Encrypted cache slot for the active user's profile.
#[derive(Clone)]
pub struct ProfileCache {
    kv: SecureKeyValueStore,
}

impl ProfileCache {
    /// Wrap an encrypted key/value store.
    pub fn new(kv: SecureKeyValueStore) -> Self {
        Self { kv }
    }

    /// Store `profile` as synced at `synced_at_ms`.
    pub fn set(&self, profile: &UserProfile, synced_at_ms: i64) -> Result<()> {
        let entry = CachedResource::new(profile.clone(), synced_at_ms);
        self.kv.put_json(PROFILE_KEY, &entry)
    }

    /// The cached profile with its sync timestamp, if any.
    pub fn get(&self) -> Result<Option<CachedResource<UserProfile>>> {
        self.kv.get_json(PROFILE_KEY)
    }

    /// The cached profile without freshness metadata.
    pub fn profile(&self) -> Result<Option<UserProfile>> {
        Ok(self.get()?.map(|entry| entry.payload))
    }

    /// Whether a profile is cached and younger than `ttl_ms` at `now_ms`.
    pub fn is_fresh_at(&self, now_ms: i64, ttl_ms: i64) -> Result<bool> {
        Ok(match self.get()? {
            Some(entry) => entry.is_fresh_at(now_ms, ttl_ms),
            None => false,
        })
    }

    /// Drop the cached profile.
    pub fn clear(&self) -> Result<()> {
        self.kv.remove(PROFILE_KEY)
    }
}
