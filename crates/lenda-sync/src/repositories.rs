//! Typed repositories for the app's view-models
//!
//! Each repository pairs the [`SyncOrchestrator`] spine with the remote
//! calls for one domain. Reads come back as [`Fetched`] so callers can
//! surface staleness; writes go to the service first and then invalidate
//! the cache rows they made stale. Bearer tokens are resolved inside the
//! fetch closures, which keeps cached reads working while a session is
//! expired or the device is offline.

use crate::api::RemoteApi;
use crate::auth::AuthSessionManager;
use crate::cache::{Fetched, Freshness};
use crate::cancel::CancelToken;
use crate::orchestrator::SyncOrchestrator;
use crate::{Error, Result};
use chrono::Utc;
use lenda_core::{
    DashboardSummary, Draft, FormMetadata, LoanApplication, LoanProduct, LoanRecord, OtpSession,
    PaymentCategory, PaymentReceipt, PaymentRecord, PaymentRequest, ResourceKind,
    SubmissionReceipt, UserProfile,
};
use lenda_storage::{DraftStore, ProfileCache};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loans: history, catalog, the application form, drafts and submission.
#[derive(Clone)]
pub struct LoanRepository {
    sync: SyncOrchestrator,
    drafts: DraftStore,
}

impl LoanRepository {
    /// Wire the repository to the spine and the draft store.
    pub fn new(sync: SyncOrchestrator, drafts: DraftStore) -> Self {
        Self { sync, drafts }
    }

    /// The signed-in user's loans, cache-first.
    pub async fn loans(&self, cancel: &CancelToken) -> Result<Fetched<Vec<LoanRecord>>> {
        let user_id = self.sync.user_id()?;
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(ResourceKind::Loans, Some(&user_id), cancel, || async move {
                let token = sync.access_token()?;
                sync.api().get_loans(&token).await.into_result()
            })
            .await
    }

    /// The loan product catalog, cache-first. Public data, no token needed.
    pub async fn products(&self, cancel: &CancelToken) -> Result<Fetched<Vec<LoanProduct>>> {
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(ResourceKind::LoanProducts, None, cancel, || async move {
                sync.api().get_loan_products().await.into_result()
            })
            .await
    }

    /// The application form layout, cache-first.
    pub async fn form_metadata(&self, cancel: &CancelToken) -> Result<Fetched<FormMetadata>> {
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(ResourceKind::FormMetadata, None, cancel, || async move {
                sync.api().get_form_metadata().await.into_result()
            })
            .await
    }

    /// Persist `application` as an in-progress draft for the signed-in
    /// user. Saving again under the same application id replaces the draft.
    pub fn save_draft(&self, application: &LoanApplication) -> Result<Draft> {
        let draft = Draft {
            application_id: application.application_id.clone(),
            user_id: self.sync.user_id()?,
            application: application.clone(),
            updated_at: Utc::now().timestamp_millis(),
        };
        self.drafts.save(&draft)?;
        Ok(draft)
    }

    /// The signed-in user's resumable drafts, most recent first.
    pub fn drafts(&self) -> Result<Vec<Draft>> {
        Ok(self.drafts.list(&self.sync.user_id()?)?)
    }

    /// One draft by application id, if the signed-in user owns it.
    pub fn draft(&self, application_id: &str) -> Result<Option<Draft>> {
        Ok(self.drafts.get(&self.sync.user_id()?, application_id)?)
    }

    /// Discard a draft. Returns whether one existed.
    pub fn delete_draft(&self, application_id: &str) -> Result<bool> {
        Ok(self.drafts.delete(application_id)?)
    }

    /// Submit a completed application.
    ///
    /// The draft is deleted only after the service acknowledges the
    /// submission, so an interrupted submit never loses work. Once the
    /// acknowledgment is in hand, local cleanup failures are logged and
    /// swallowed rather than resurfacing as a submit failure.
    pub async fn submit(
        &self,
        application: &LoanApplication,
        cancel: &CancelToken,
    ) -> Result<SubmissionReceipt> {
        if application.amount_minor <= 0 {
            return Err(Error::Validation(
                "Loan amount must be positive".to_string(),
            ));
        }
        if application.term_months == 0 {
            return Err(Error::Validation(
                "Loan term must be at least one month".to_string(),
            ));
        }
        cancel.check()?;

        let token = self.sync.access_token()?;
        let receipt = self
            .sync
            .api()
            .submit_application(&token, application)
            .await
            .into_result()?;
        debug!(reference = %receipt.reference, "application acknowledged");

        if let Err(e) = self.drafts.delete(&application.application_id) {
            warn!(
                application_id = %application.application_id,
                error = %e,
                "draft cleanup failed after submit"
            );
        }
        invalidate_account_caches(
            &self.sync,
            &[ResourceKind::Loans, ResourceKind::Dashboard],
            "submit",
        );
        Ok(receipt)
    }
}

/// Payments: history, categories, the dashboard and payment execution.
#[derive(Clone)]
pub struct PaymentRepository {
    sync: SyncOrchestrator,
}

impl PaymentRepository {
    /// Wire the repository to the spine.
    pub fn new(sync: SyncOrchestrator) -> Self {
        Self { sync }
    }

    /// The signed-in user's payment history, cache-first.
    pub async fn payments(&self, cancel: &CancelToken) -> Result<Fetched<Vec<PaymentRecord>>> {
        let user_id = self.sync.user_id()?;
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(ResourceKind::Payments, Some(&user_id), cancel, || async move {
                let token = sync.access_token()?;
                sync.api().get_payments(&token).await.into_result()
            })
            .await
    }

    /// The payment category catalog, cache-first. Public data.
    pub async fn categories(&self, cancel: &CancelToken) -> Result<Fetched<Vec<PaymentCategory>>> {
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(
                ResourceKind::PaymentCategories,
                None,
                cancel,
                || async move { sync.api().get_payment_categories().await.into_result() },
            )
            .await
    }

    /// The home screen aggregate figures, cache-first.
    pub async fn dashboard(&self, cancel: &CancelToken) -> Result<Fetched<DashboardSummary>> {
        let user_id = self.sync.user_id()?;
        let sync = self.sync.clone();
        self.sync
            .cache()
            .get_or_fetch(
                ResourceKind::Dashboard,
                Some(&user_id),
                cancel,
                || async move {
                    let token = sync.access_token()?;
                    sync.api().get_dashboard(&token).await.into_result()
                },
            )
            .await
    }

    /// Execute a payment.
    pub async fn submit(
        &self,
        request: &PaymentRequest,
        cancel: &CancelToken,
    ) -> Result<PaymentReceipt> {
        if request.amount_minor <= 0 {
            return Err(Error::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        if request.target_account.trim().is_empty() {
            return Err(Error::Validation(
                "Payment target account is required".to_string(),
            ));
        }
        cancel.check()?;

        let token = self.sync.access_token()?;
        let receipt = self
            .sync
            .api()
            .submit_payment(&token, request)
            .await
            .into_result()?;
        debug!(reference = %receipt.reference, "payment acknowledged");

        invalidate_account_caches(
            &self.sync,
            &[ResourceKind::Payments, ResourceKind::Dashboard],
            "payment",
        );
        Ok(receipt)
    }
}

/// Default freshness window for the cached profile.
pub const DEFAULT_PROFILE_TTL_MS: i64 = 3_600_000;

/// The signed-in user's profile, plus the mobile-number change flow.
#[derive(Clone)]
pub struct ProfileRepository {
    sync: SyncOrchestrator,
    cache: ProfileCache,
    auth: Arc<AuthSessionManager>,
    ttl_ms: i64,
}

impl ProfileRepository {
    /// Wire the repository to the spine, the encrypted profile cache and
    /// the session manager (which owns the mobile-change flow state).
    pub fn new(sync: SyncOrchestrator, cache: ProfileCache, auth: Arc<AuthSessionManager>) -> Self {
        Self {
            sync,
            cache,
            auth,
            ttl_ms: DEFAULT_PROFILE_TTL_MS,
        }
    }

    /// Override the profile freshness window.
    pub fn with_ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// The signed-in user's profile, cache-first with stale fallback.
    ///
    /// The profile lives in the encrypted store rather than the domain
    /// cache because it carries PII, but it follows the same serve / fetch
    /// / fall-back contract.
    pub async fn profile(&self, cancel: &CancelToken) -> Result<Fetched<UserProfile>> {
        cancel.check()?;
        let now_ms = Utc::now().timestamp_millis();

        let cached = self.cache.get()?;
        if let Some(entry) = &cached {
            if entry.is_fresh_at(now_ms, self.ttl_ms) {
                debug!("serving fresh profile cache");
                return Ok(Fetched {
                    value: entry.payload.clone(),
                    freshness: Freshness::Cached,
                    last_synced_at: entry.last_synced_at,
                });
            }
        }

        match self.fetch_profile().await {
            Ok(profile) => {
                // An abandoned fetch must not overwrite the cache.
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                self.cache.set(&profile, now_ms)?;
                Ok(Fetched {
                    value: profile,
                    freshness: Freshness::Remote,
                    last_synced_at: now_ms,
                })
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(fetch_err) => match cached {
                Some(entry) => {
                    warn!(error = %fetch_err, "profile fetch failed, serving stale cache");
                    Ok(Fetched {
                        value: entry.payload,
                        freshness: Freshness::ServedStale,
                        last_synced_at: entry.last_synced_at,
                    })
                }
                None => Err(fetch_err),
            },
        }
    }

    /// Bypass the cache and pull the profile now. Failure propagates; the
    /// cached copy is left untouched.
    pub async fn refresh(&self, cancel: &CancelToken) -> Result<UserProfile> {
        cancel.check()?;
        let profile = self.fetch_profile().await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.cache.set(&profile, Utc::now().timestamp_millis())?;
        Ok(profile)
    }

    /// Begin changing the account's mobile number: an OTP goes to the new
    /// number.
    pub async fn start_mobile_change(&self, new_phone: &str) -> Result<OtpSession> {
        self.auth.start_mobile_change(new_phone).await
    }

    /// Check the code sent to the new number.
    pub async fn verify_mobile_change(&self, code: &str) -> Result<()> {
        self.auth.verify_mobile_change(code).await
    }

    /// Confirm the change with the account PIN. Returns the updated
    /// profile, which is also persisted to the cache.
    pub async fn confirm_mobile_change(&self, pin: &str) -> Result<UserProfile> {
        self.auth.confirm_mobile_change(pin).await
    }

    async fn fetch_profile(&self) -> Result<UserProfile> {
        let token = self.sync.access_token()?;
        self.sync.api().get_profile(&token).await.into_result()
    }
}

// Writes leave the listed account-scoped rows stale; dropping them forces
// the next read to fetch. The write already succeeded remotely, so local
// failures here are logged, not returned.
fn invalidate_account_caches(sync: &SyncOrchestrator, kinds: &[ResourceKind], op: &str) {
    match sync.user_id() {
        Ok(user_id) => {
            for kind in kinds {
                if let Err(e) = sync.cache().invalidate(*kind, Some(&user_id)) {
                    warn!(%kind, op, error = %e, "cache invalidation failed");
                }
            }
        }
        Err(e) => warn!(op, error = %e, "cache invalidation skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, DomainCache};
    use crate::mock::MockRemoteApi;
    use lenda_core::AuthToken;
    use lenda_storage::{
        CacheStore, Database, KeyMaterial, KeyTier, MemoryBlobStore, SecretCipher,
        SecureKeyValueStore, SessionStore,
    };

    fn stack() -> (Arc<MockRemoteApi>, SyncOrchestrator, DraftStore) {
        let api = Arc::new(MockRemoteApi::new());
        let cipher = Arc::new(SecretCipher::new(KeyMaterial::generate(
            "app_secret".to_string(),
            KeyTier::Minimal,
        )));
        let kv = SecureKeyValueStore::new(Arc::new(MemoryBlobStore::new()), Arc::clone(&cipher));
        let sessions = SessionStore::new(kv);
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = DomainCache::new(
            CacheStore::new(Arc::clone(&db), Arc::clone(&cipher)),
            CachePolicy::new(),
        );
        let drafts = DraftStore::new(db, cipher);
        let sync = SyncOrchestrator::new(api.clone() as Arc<dyn RemoteApi>, cache, sessions);
        (api, sync, drafts)
    }

    fn signed_in(sync: &SyncOrchestrator) {
        let token = AuthToken::new(
            "access-1".to_string(),
            "refresh-1".to_string(),
            "Bearer".to_string(),
            3_600,
            "user-1".to_string(),
        );
        sync.sessions().save_token(&token).unwrap();
    }

    fn application(amount_minor: i64, term_months: u32) -> LoanApplication {
        LoanApplication {
            application_id: "app-1".to_string(),
            product_id: "prod-flexi".to_string(),
            amount_minor,
            currency: "KES".to_string(),
            term_months,
            answers: serde_json::json!({"employment": "employed"}),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_amount_before_any_network_call() {
        let (api, sync, drafts) = stack();
        signed_in(&sync);
        let repo = LoanRepository::new(sync, drafts);

        let err = repo
            .submit(&application(0, 6), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(api.calls("submit_application"), 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_zero_term_before_any_network_call() {
        let (api, sync, drafts) = stack();
        signed_in(&sync);
        let repo = LoanRepository::new(sync, drafts);

        let err = repo
            .submit(&application(100_000, 0), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(api.calls("submit_application"), 0);
    }

    #[tokio::test]
    async fn test_payment_validation_gates_locally() {
        let (api, sync, _) = stack();
        signed_in(&sync);
        let repo = PaymentRepository::new(sync);

        let bad_amount = PaymentRequest {
            category_id: "cat-water".to_string(),
            target_account: "acct-9".to_string(),
            amount_minor: -50,
            currency: "KES".to_string(),
            note: None,
        };
        assert!(matches!(
            repo.submit(&bad_amount, &CancelToken::new()).await,
            Err(Error::Validation(_))
        ));

        let blank_target = PaymentRequest {
            target_account: "  ".to_string(),
            amount_minor: 5_000,
            ..bad_amount
        };
        assert!(matches!(
            repo.submit(&blank_target, &CancelToken::new()).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(api.calls("submit_payment"), 0);
    }

    #[test]
    fn test_save_draft_stamps_the_signed_in_user() {
        let (_, sync, drafts) = stack();
        signed_in(&sync);
        let repo = LoanRepository::new(sync, drafts);

        let draft = repo.save_draft(&application(250_000, 6)).unwrap();
        assert_eq!(draft.user_id, "user-1");
        assert_eq!(repo.drafts().unwrap().len(), 1);
    }

    #[test]
    fn test_drafts_require_a_session() {
        let (_, sync, drafts) = stack();
        let repo = LoanRepository::new(sync, drafts);

        assert!(matches!(
            repo.save_draft(&application(250_000, 6)),
            Err(Error::TokenExpired)
        ));
    }
}
