//! Cache-or-fetch with stale fallback
//!
//! One generic routine serves every synced resource kind: return fresh
//! cache without touching the network, fetch and persist when stale or
//! absent, and fall back to stale data when the fetch fails. Callers see
//! which of the three happened through [`Freshness`].

use crate::cancel::CancelToken;
use crate::{Error, Result};
use chrono::Utc;
use lenda_core::ResourceKind;
use lenda_storage::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

/// How the returned value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched from the service just now.
    Remote,
    /// Served from cache inside its freshness window.
    Cached,
    /// Served from cache past its freshness window because the fetch failed.
    ServedStale,
}

/// A payload plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// The payload.
    pub value: T,
    /// How the payload was obtained.
    pub freshness: Freshness,
    /// When the payload was last synced, epoch milliseconds.
    pub last_synced_at: i64,
}

impl<T> Fetched<T> {
    /// Whether the caller should show a stale-data indicator.
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::ServedStale
    }
}

/// Freshness windows per resource kind.
///
/// Defaults come from [`ResourceKind::sync_interval_ms`]; individual kinds
/// can be overridden, which the harness and tests use to force expiry.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    overrides: HashMap<ResourceKind, i64>,
}

impl CachePolicy {
    /// Policy using every kind's default interval.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the freshness window for `kind`.
    pub fn with_ttl(mut self, kind: ResourceKind, ttl_ms: i64) -> Self {
        self.overrides.insert(kind, ttl_ms);
        self
    }

    /// The freshness window for `kind`.
    pub fn ttl_ms(&self, kind: ResourceKind) -> i64 {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.sync_interval_ms())
    }
}

/// TTL-driven read-through cache over the persisted [`CacheStore`].
#[derive(Clone)]
pub struct DomainCache {
    store: CacheStore,
    policy: CachePolicy,
}

impl DomainCache {
    /// Create a cache over `store` with `policy`.
    pub fn new(store: CacheStore, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    /// The policy in effect.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serve `kind` for `user_id` from cache, or fetch it.
    ///
    /// Within the freshness window the cached payload is returned and
    /// `fetch` is never called. Past it, `fetch` runs; its result is
    /// persisted and returned, unless `cancel` fired while it was in
    /// flight, in which case nothing is written and `Cancelled` comes
    /// back. A failed fetch falls back to the stale entry, returned
    /// exactly as stored; with nothing cached the failure propagates.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        kind: ResourceKind,
        user_id: Option<&str>,
        cancel: &CancelToken,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        cancel.check()?;

        let key = kind.cache_key(user_id);
        let ttl_ms = self.policy.ttl_ms(kind);
        let now_ms = Utc::now().timestamp_millis();

        let mut cached = self.store.get(&key)?;
        if let Some(row) = &cached {
            if now_ms.saturating_sub(row.last_synced_at) < ttl_ms {
                match serde_json::from_str(&row.payload) {
                    Ok(value) => {
                        debug!(%kind, "serving fresh cache");
                        return Ok(Fetched {
                            value,
                            freshness: Freshness::Cached,
                            last_synced_at: row.last_synced_at,
                        });
                    }
                    Err(e) => {
                        warn!(%kind, error = %e, "unparseable cache row, dropping");
                        self.store.remove(&key)?;
                        cached = None;
                    }
                }
            }
        }

        match fetch().await {
            Ok(value) => {
                // An abandoned fetch must not overwrite the cache.
                if cancel.is_cancelled() {
                    debug!(%kind, "fetch cancelled, discarding result");
                    return Err(Error::Cancelled);
                }
                let payload = serde_json::to_string(&value)
                    .map_err(|e| Error::Unknown(format!("cache serialization failed: {e}")))?;
                self.store.put(&key, &payload, now_ms)?;
                debug!(%kind, "fetched and cached");
                Ok(Fetched {
                    value,
                    freshness: Freshness::Remote,
                    last_synced_at: now_ms,
                })
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(fetch_err) => {
                if let Some(row) = cached {
                    match serde_json::from_str(&row.payload) {
                        Ok(value) => {
                            warn!(%kind, error = %fetch_err, "fetch failed, serving stale cache");
                            return Ok(Fetched {
                                value,
                                freshness: Freshness::ServedStale,
                                last_synced_at: row.last_synced_at,
                            });
                        }
                        Err(e) => {
                            warn!(%kind, error = %e, "unparseable stale row, dropping");
                            self.store.remove(&key)?;
                        }
                    }
                }
                Err(fetch_err)
            }
        }
    }

    /// Drop the cached entry for `kind`/`user_id`, forcing the next read
    /// to fetch. Returns whether an entry existed.
    pub fn invalidate(&self, kind: ResourceKind, user_id: Option<&str>) -> Result<bool> {
        Ok(self.store.remove(&kind.cache_key(user_id))?)
    }

    /// Drop every cached entry scoped to `user_id`.
    pub fn invalidate_user(&self, user_id: &str) -> Result<usize> {
        Ok(self.store.clear_for_user(user_id)?)
    }
}
