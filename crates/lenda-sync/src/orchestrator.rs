//! Shared spine of the data layer
//!
//! [`SyncOrchestrator`] bundles the remote service, the encrypted domain
//! cache and the session store. Repositories hold a clone of it and ask it
//! the two questions every authorized call starts with: who is signed in,
//! and what bearer token do we present.

use crate::api::RemoteApi;
use crate::cache::DomainCache;
use chrono::Utc;
use lenda_core::{Error, Result};
use lenda_storage::SessionStore;
use std::sync::Arc;

/// Shared handle to the remote service, domain cache and session store.
#[derive(Clone)]
pub struct SyncOrchestrator {
    api: Arc<dyn RemoteApi>,
    cache: DomainCache,
    sessions: SessionStore,
}

impl SyncOrchestrator {
    /// Assemble the spine from its parts.
    pub fn new(api: Arc<dyn RemoteApi>, cache: DomainCache, sessions: SessionStore) -> Self {
        Self {
            api,
            cache,
            sessions,
        }
    }

    /// The remote service.
    pub fn api(&self) -> Arc<dyn RemoteApi> {
        Arc::clone(&self.api)
    }

    /// The encrypted domain cache.
    pub fn cache(&self) -> &DomainCache {
        &self.cache
    }

    /// The session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Bearer token for an authorized call.
    ///
    /// Fails with [`Error::TokenExpired`] when no session is stored or the
    /// stored token's lifetime has elapsed. Repositories resolve this inside
    /// their fetch closures, so cached reads keep working after expiry.
    pub fn access_token(&self) -> Result<String> {
        let now_ms = Utc::now().timestamp_millis();
        match self.sessions.token()? {
            Some(token) if !token.is_expired_at(now_ms) => Ok(token.access_token),
            _ => Err(Error::TokenExpired),
        }
    }

    /// The signed-in user's id, used to scope cache rows.
    ///
    /// An expired access token still identifies the user; only a missing
    /// session fails, with [`Error::TokenExpired`].
    pub fn user_id(&self) -> Result<String> {
        match self.sessions.user_id()? {
            Some(user_id) => Ok(user_id),
            None => Err(Error::TokenExpired),
        }
    }
}
