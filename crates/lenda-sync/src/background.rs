//! Background token refresh
//!
//! Keeps a signed-in session's access token fresh without user
//! interaction. One worker per process, stoppable through its
//! [`CancelToken`].

use crate::auth::{AuthSessionManager, SessionState};
use crate::cancel::CancelToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Token refresh worker configuration
#[derive(Debug, Clone)]
pub struct RefreshWorkerConfig {
    /// Seconds between refresh-window checks
    pub check_interval_secs: u64,
}

impl Default for RefreshWorkerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60, // one check per minute
        }
    }
}

/// Outcome of one worker run, start to cancellation.
#[derive(Debug, Clone, Default)]
pub struct RefreshWorkerReport {
    /// Refresh-window checks performed
    pub checks: u64,
    /// Refreshes that installed a new token pair
    pub refreshed: u64,
    /// Refresh attempts that failed
    pub failures: u64,
    /// Whether a rejected refresh tore the session down
    pub session_lost: bool,
}

/// Periodic refresh-window check driving [`AuthSessionManager::refresh`].
pub struct TokenRefreshWorker {
    manager: Arc<AuthSessionManager>,
    config: RefreshWorkerConfig,
    cancel: CancelToken,
}

#[allow(dead_code)]
fn _assert_token_refresh_worker_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TokenRefreshWorker>();
}

impl TokenRefreshWorker {
    /// Create a worker over `manager`, stoppable through `cancel`.
    pub fn new(
        manager: Arc<AuthSessionManager>,
        config: RefreshWorkerConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            manager,
            config,
            cancel,
        }
    }

    /// Run until the cancel token fires.
    ///
    /// Every tick checks whether the persisted token is inside its refresh
    /// window and refreshes it if so. Transient failures are retried on the
    /// next tick; a rejection ends the session (the manager clears it) and
    /// the worker keeps ticking quietly in case the user signs in again.
    pub async fn run(&self) -> RefreshWorkerReport {
        let mut report = RefreshWorkerReport::default();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));
        // Missed windows collapse into the next check.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.check_interval_secs,
            "token refresh worker started"
        );
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(
                        checks = report.checks,
                        refreshed = report.refreshed,
                        failures = report.failures,
                        "token refresh worker stopped"
                    );
                    return report;
                }
                _ = interval.tick() => {
                    report.checks += 1;
                    self.tick(&mut report).await;
                }
            }
        }
    }

    async fn tick(&self, report: &mut RefreshWorkerReport) {
        match self.manager.needs_refresh() {
            Ok(true) => {
                debug!("token inside refresh window, refreshing");
                match self.manager.refresh().await {
                    Ok(_) => report.refreshed += 1,
                    Err(e) => {
                        report.failures += 1;
                        if self.manager.state() == SessionState::Anonymous {
                            report.session_lost = true;
                            warn!(error = %e, "refresh rejected, session ended");
                        } else {
                            warn!(error = %e, "refresh attempt failed, will retry");
                        }
                    }
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "refresh-window check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionConfig;
    use crate::mock::MockRemoteApi;
    use lenda_storage::{
        KeyMaterial, KeyTier, MemoryBlobStore, ProfileCache, SecretCipher, SecureKeyValueStore,
        SessionStore,
    };

    fn manager_over(api: Arc<MockRemoteApi>) -> (Arc<AuthSessionManager>, SessionStore) {
        let cipher = Arc::new(SecretCipher::new(KeyMaterial::generate(
            "app_secret".to_string(),
            KeyTier::Minimal,
        )));
        let kv = SecureKeyValueStore::new(Arc::new(MemoryBlobStore::new()), cipher);
        let sessions = SessionStore::new(kv.clone());
        let profile = ProfileCache::new(kv);
        let manager = Arc::new(AuthSessionManager::new(
            api,
            sessions.clone(),
            profile,
            SessionConfig::default(),
        ));
        (manager, sessions)
    }

    // Shift the persisted token into its refresh window without waiting.
    fn backdate_token(sessions: &SessionStore, by_ms: i64) {
        let mut token = sessions.token().unwrap().unwrap();
        token.created_at -= by_ms;
        sessions.save_token(&token).unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = RefreshWorkerConfig::default();
        assert_eq!(config.check_interval_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_refreshes_once_then_stays_quiet() {
        let api = Arc::new(MockRemoteApi::new());
        api.register_user("+254712345678", "8362", "Amina");
        let (manager, sessions) = manager_over(Arc::clone(&api));
        manager.login_with_pin("0712345678", "8362").await.unwrap();
        let before = manager.current_token().unwrap().unwrap();
        backdate_token(&sessions, 3_500_000);

        let cancel = CancelToken::new();
        let worker = TokenRefreshWorker::new(
            Arc::clone(&manager),
            RefreshWorkerConfig::default(),
            cancel.clone(),
        );
        let handle = tokio::spawn(async move { worker.run().await });

        // Virtual minutes pass; the first tick refreshes, later ticks find
        // a young token and do nothing.
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert!(report.checks >= 2);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failures, 0);
        assert!(!report.session_lost);

        let after = manager.current_token().unwrap().unwrap();
        assert_ne!(after.refresh_token, before.refresh_token);
        assert_eq!(after.user_id, before.user_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_refresh_ends_session_and_worker_survives() {
        let api = Arc::new(MockRemoteApi::new());
        api.register_user("+254712345678", "8362", "Amina");
        let (manager, sessions) = manager_over(Arc::clone(&api));
        manager.login_with_pin("0712345678", "8362").await.unwrap();
        backdate_token(&sessions, 3_500_000);
        api.set_offline(true);

        let cancel = CancelToken::new();
        let worker = TokenRefreshWorker::new(
            Arc::clone(&manager),
            RefreshWorkerConfig::default(),
            cancel.clone(),
        );
        let handle = tokio::spawn(async move { worker.run().await });

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.failures, 1);
        assert!(report.session_lost);
        // The torn-down session leaves later ticks with nothing to do.
        assert!(report.checks >= 2);
        assert_eq!(manager.current_token().unwrap(), None);
        assert_eq!(manager.state(), SessionState::Anonymous);
    }
}
