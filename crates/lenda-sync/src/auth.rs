//! Session lifecycle state machine
//!
//! Drives the OTP → PIN → token flow against the remote service and keeps
//! the persisted session consistent with it. Local gates run before any
//! network call: malformed input, expired OTP sessions, and exhausted
//! attempt budgets are all rejected without touching the service.

use crate::api::{ApiResponse, LoginGrant, RemoteApi};
use crate::{Error, Result};
use chrono::Utc;
use lenda_core::{
    normalize_phone, validate_pin, AuthToken, OtpSession, UserProfile, DEFAULT_REFRESH_BUFFER_SECS,
};
use lenda_storage::{ProfileCache, SessionStore};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials, no flow in progress.
    Anonymous,
    /// An OTP has been dispatched and awaits verification.
    OtpSent,
    /// The OTP passed; a temp token authorizes the PIN step.
    OtpVerified,
    /// A valid token is held.
    LoggedIn,
    /// The OTP attempt budget is spent; only a fresh OTP request helps.
    Locked,
}

impl SessionState {
    /// Stable string form for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::OtpSent => "otp_sent",
            SessionState::OtpVerified => "otp_verified",
            SessionState::LoggedIn => "logged_in",
            SessionState::Locked => "locked",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs for the session flow.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default country code for normalizing local phone numbers.
    pub country_code: String,
    /// How long before real expiry a token counts as needing refresh.
    pub refresh_buffer_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            country_code: "254".to_string(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
        }
    }
}

enum AuthFlow {
    Anonymous,
    OtpSent {
        session: OtpSession,
    },
    OtpVerified {
        phone: String,
        temp_token: String,
        is_new_user: bool,
    },
    LoggedIn {
        token: AuthToken,
    },
    Locked {
        phone: String,
    },
}

struct ChangeFlow {
    session: OtpSession,
    ticket: Option<String>,
}

/// The session state machine.
///
/// One instance per process; every auth-affecting call goes through it so
/// the in-memory state, the persisted token, and the cached profile move
/// together.
pub struct AuthSessionManager {
    api: Arc<dyn RemoteApi>,
    sessions: SessionStore,
    profile: ProfileCache,
    config: SessionConfig,
    state: Mutex<AuthFlow>,
    change: Mutex<Option<ChangeFlow>>,
}

impl AuthSessionManager {
    /// Wire the manager to its collaborators.
    pub fn new(
        api: Arc<dyn RemoteApi>,
        sessions: SessionStore,
        profile: ProfileCache,
        config: SessionConfig,
    ) -> Self {
        Self {
            api,
            sessions,
            profile,
            config,
            state: Mutex::new(AuthFlow::Anonymous),
            change: Mutex::new(None),
        }
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        match &*self.state.lock() {
            AuthFlow::Anonymous => SessionState::Anonymous,
            AuthFlow::OtpSent { .. } => SessionState::OtpSent,
            AuthFlow::OtpVerified { .. } => SessionState::OtpVerified,
            AuthFlow::LoggedIn { .. } => SessionState::LoggedIn,
            AuthFlow::Locked { .. } => SessionState::Locked,
        }
    }

    /// The phone number the in-flight flow is bound to, if any.
    pub fn pending_phone(&self) -> Option<String> {
        match &*self.state.lock() {
            AuthFlow::OtpSent { session } => Some(session.phone_number.clone()),
            AuthFlow::OtpVerified { phone, .. } => Some(phone.clone()),
            AuthFlow::Locked { phone } => Some(phone.clone()),
            _ => None,
        }
    }

    /// After a verified OTP: whether the phone number has no account yet.
    pub fn is_new_user(&self) -> Option<bool> {
        match &*self.state.lock() {
            AuthFlow::OtpVerified { is_new_user, .. } => Some(*is_new_user),
            _ => None,
        }
    }

    /// The persisted token, if any.
    pub fn current_token(&self) -> Result<Option<AuthToken>> {
        Ok(self.sessions.token()?)
    }

    /// Whether the persisted token is inside its refresh window.
    pub fn needs_refresh(&self) -> Result<bool> {
        Ok(self
            .sessions
            .token()?
            .map(|t| t.needs_refresh(self.config.refresh_buffer_secs))
            .unwrap_or(false))
    }

    /// Bootstrap the session from persisted state on app start.
    ///
    /// A valid token restores `LoggedIn` directly; an expired one gets a
    /// silent refresh attempt, landing on `Anonymous` if that fails.
    pub async fn restore(&self) -> Result<SessionState> {
        match self.sessions.token()? {
            None => {
                *self.state.lock() = AuthFlow::Anonymous;
                Ok(SessionState::Anonymous)
            }
            Some(token) if !token.is_expired() => {
                debug!(user_id = %token.user_id, "restored persisted session");
                *self.state.lock() = AuthFlow::LoggedIn { token };
                Ok(SessionState::LoggedIn)
            }
            Some(_) => {
                debug!("persisted token expired, attempting silent refresh");
                match self.refresh().await {
                    Ok(state) => Ok(state),
                    Err(e) => {
                        debug!(error = %e, "silent refresh failed");
                        *self.state.lock() = AuthFlow::Anonymous;
                        Ok(SessionState::Anonymous)
                    }
                }
            }
        }
    }

    /// Dispatch an OTP to `phone`, starting a fresh flow.
    ///
    /// Validation rejects malformed numbers before any network call. Also
    /// the way out of `Locked`.
    pub async fn request_otp(&self, phone: &str) -> Result<OtpSession> {
        let normalized = normalize_phone(phone, &self.config.country_code)?;
        let challenge = self.api.send_otp(&normalized).await.into_result()?;

        let now_ms = Utc::now().timestamp_millis();
        let ttl_ms = challenge.expires_at_ms.saturating_sub(now_ms);
        let session = OtpSession::new(
            challenge.session_id,
            normalized,
            None,
            now_ms,
            ttl_ms,
            challenge.max_attempts,
        );
        info!(
            phone = %session.phone_number,
            max_attempts = session.max_attempts,
            "OTP dispatched"
        );
        *self.state.lock() = AuthFlow::OtpSent {
            session: session.clone(),
        };
        Ok(session)
    }

    /// Check `code` against the in-flight OTP session.
    ///
    /// Expired sessions and spent attempt budgets fail locally without a
    /// network call. Each call that reaches the service consumes one
    /// attempt; a rejection on the final attempt locks the flow.
    pub async fn verify_otp(&self, code: &str) -> Result<SessionState> {
        let (session_id, last_attempt) = {
            let mut state = self.state.lock();
            match &mut *state {
                AuthFlow::Locked { .. } => return Err(Error::MaxAttemptsExceeded),
                AuthFlow::OtpSent { session } => {
                    if session.is_used {
                        return Err(Error::Validation("OTP session already used".to_string()));
                    }
                    if session.is_expired() {
                        *state = AuthFlow::Anonymous;
                        return Err(Error::OtpExpired);
                    }
                    if !session.has_attempts_remaining() {
                        let phone = session.phone_number.clone();
                        *state = AuthFlow::Locked { phone };
                        return Err(Error::MaxAttemptsExceeded);
                    }
                    session.record_attempt();
                    (session.id.clone(), !session.has_attempts_remaining())
                }
                _ => {
                    return Err(Error::Validation("no OTP session in progress".to_string()));
                }
            }
        };

        match self.api.verify_otp(&session_id, code).await.into_result() {
            Ok(verified) => {
                let mut state = self.state.lock();
                if let AuthFlow::OtpSent { session } = &mut *state {
                    session.mark_used();
                    let phone = session.phone_number.clone();
                    info!(phone = %phone, "OTP verified");
                    *state = AuthFlow::OtpVerified {
                        phone,
                        temp_token: verified.temp_token,
                        is_new_user: verified.is_new_user,
                    };
                }
                Ok(SessionState::OtpVerified)
            }
            Err(e) => {
                if last_attempt {
                    let mut state = self.state.lock();
                    if let AuthFlow::OtpSent { session } = &*state {
                        let phone = session.phone_number.clone();
                        warn!(phone = %phone, "OTP attempts exhausted, flow locked");
                        *state = AuthFlow::Locked { phone };
                    }
                }
                Err(e)
            }
        }
    }

    /// Set the account PIN after a verified OTP and sign in.
    ///
    /// Persisting the token and the profile is one logical step: if either
    /// write fails the whole operation fails and the credentials are torn
    /// down, leaving the flow at `OtpVerified` for another try.
    pub async fn set_pin(&self, pin: &str) -> Result<SessionState> {
        validate_pin(pin)?;
        let temp_token = {
            let state = self.state.lock();
            match &*state {
                AuthFlow::OtpVerified { temp_token, .. } => temp_token.clone(),
                _ => {
                    return Err(Error::Validation(
                        "OTP verification required before setting a PIN".to_string(),
                    ));
                }
            }
        };

        let grant = self.api.set_pin(&temp_token, pin).await.into_result()?;
        let token = self.persist_grant(grant)?;
        info!(user_id = %token.user_id, "PIN set, session established");
        *self.state.lock() = AuthFlow::LoggedIn { token };
        Ok(SessionState::LoggedIn)
    }

    /// Sign in with phone number and PIN.
    pub async fn login_with_pin(&self, phone: &str, pin: &str) -> Result<SessionState> {
        let normalized = normalize_phone(phone, &self.config.country_code)?;
        validate_pin(pin)?;

        let grant = self.api.login(&normalized, pin).await.into_result()?;
        let token = self.persist_grant(grant)?;
        info!(user_id = %token.user_id, "signed in");
        *self.state.lock() = AuthFlow::LoggedIn { token };
        Ok(SessionState::LoggedIn)
    }

    /// Refresh the token if it is inside its refresh window.
    pub async fn refresh_if_needed(&self) -> Result<SessionState> {
        match self.sessions.token()? {
            Some(token) if token.needs_refresh(self.config.refresh_buffer_secs) => {
                self.refresh().await
            }
            _ => Ok(self.state()),
        }
    }

    /// Trade the refresh token for fresh credentials.
    ///
    /// The replacement inherits the user id. A rejection from the service
    /// clears the persisted session and forces `Anonymous`; an in-flight
    /// marker is returned as a retriable error without teardown.
    pub async fn refresh(&self) -> Result<SessionState> {
        let Some(token) = self.sessions.token()? else {
            return Err(Error::TokenExpired);
        };

        match self.api.refresh_token(&token.refresh_token).await {
            ApiResponse::Success(grant) => {
                let now_ms = Utc::now().timestamp_millis();
                let rotated = token.rotated(
                    grant.access_token,
                    grant.refresh_token,
                    grant.token_type,
                    grant.expires_in,
                    now_ms,
                );
                if let Err(e) = self.sessions.save_token(&rotated) {
                    warn!(error = %e, "rotated token persistence failed, tearing session down");
                    if let Err(clear_err) = self.sessions.clear_all() {
                        warn!(error = %clear_err, "session teardown also failed");
                    }
                    *self.state.lock() = AuthFlow::Anonymous;
                    return Err(e.into());
                }
                debug!(user_id = %rotated.user_id, "token rotated");
                *self.state.lock() = AuthFlow::LoggedIn { token: rotated };
                Ok(SessionState::LoggedIn)
            }
            ApiResponse::Loading => {
                Err(Error::Network("remote response still loading".to_string()))
            }
            ApiResponse::Error(message) => {
                warn!(message = %message, "token refresh rejected, forcing re-authentication");
                self.sessions.clear_all()?;
                *self.state.lock() = AuthFlow::Anonymous;
                Err(Error::TokenExpired)
            }
        }
    }

    /// Sign out.
    ///
    /// The remote call is best-effort; clearing the persisted session and
    /// the cached profile is mandatory, and success is reported only when
    /// both clears succeed.
    pub async fn logout(&self) -> Result<SessionState> {
        if let Ok(Some(token)) = self.sessions.token() {
            match self.api.logout(&token.access_token).await {
                ApiResponse::Success(()) => debug!("remote logout acknowledged"),
                ApiResponse::Error(message) => {
                    debug!(message = %message, "remote logout failed, proceeding with local teardown");
                }
                ApiResponse::Loading => {
                    debug!("remote logout still loading, proceeding with local teardown");
                }
            }
        }

        *self.state.lock() = AuthFlow::Anonymous;
        *self.change.lock() = None;

        let session_clear = self.sessions.clear_all();
        let profile_clear = self.profile.clear();
        session_clear?;
        profile_clear?;
        info!("signed out");
        Ok(SessionState::Anonymous)
    }

    /// Begin changing the account's mobile number.
    ///
    /// Sends an OTP to the new number; requires a signed-in session.
    pub async fn start_mobile_change(&self, new_phone: &str) -> Result<OtpSession> {
        let normalized = normalize_phone(new_phone, &self.config.country_code)?;
        let access_token = self.require_access_token()?;

        let challenge = self
            .api
            .start_mobile_change(&access_token, &normalized)
            .await
            .into_result()?;

        let now_ms = Utc::now().timestamp_millis();
        let session = OtpSession::new(
            challenge.session_id,
            normalized,
            None,
            now_ms,
            challenge.expires_at_ms.saturating_sub(now_ms),
            challenge.max_attempts,
        );
        info!(phone = %session.phone_number, "mobile change started");
        *self.change.lock() = Some(ChangeFlow {
            session: session.clone(),
            ticket: None,
        });
        Ok(session)
    }

    /// Check the OTP sent to the new number.
    ///
    /// Same local gates and attempt accounting as [`verify_otp`]; the
    /// proof ticket is held for the confirm step.
    ///
    /// [`verify_otp`]: AuthSessionManager::verify_otp
    pub async fn verify_mobile_change(&self, code: &str) -> Result<()> {
        let access_token = self.require_access_token()?;
        let session_id = {
            let mut change = self.change.lock();
            let Some(flow) = change.as_mut() else {
                return Err(Error::Validation("no mobile change in progress".to_string()));
            };
            if flow.session.is_used {
                return Err(Error::Validation(
                    "mobile change already verified".to_string(),
                ));
            }
            if flow.session.is_expired() {
                *change = None;
                return Err(Error::OtpExpired);
            }
            if !flow.session.has_attempts_remaining() {
                return Err(Error::MaxAttemptsExceeded);
            }
            flow.session.record_attempt();
            flow.session.id.clone()
        };

        let ticket = self
            .api
            .verify_mobile_change(&access_token, &session_id, code)
            .await
            .into_result()?;

        let mut change = self.change.lock();
        if let Some(flow) = change.as_mut() {
            flow.session.mark_used();
            flow.ticket = Some(ticket.ticket_id);
        }
        Ok(())
    }

    /// Finish the mobile change with a PIN re-check.
    ///
    /// The updated profile replaces the cached one; a profile persistence
    /// failure fails the operation.
    pub async fn confirm_mobile_change(&self, pin: &str) -> Result<UserProfile> {
        validate_pin(pin)?;
        let access_token = self.require_access_token()?;
        let ticket_id = {
            let change = self.change.lock();
            match change.as_ref().and_then(|flow| flow.ticket.clone()) {
                Some(ticket_id) => ticket_id,
                None => {
                    return Err(Error::Validation("mobile change not verified".to_string()));
                }
            }
        };

        let updated = self
            .api
            .confirm_mobile_change(&access_token, &ticket_id, pin)
            .await
            .into_result()?;
        self.profile
            .set(&updated, Utc::now().timestamp_millis())?;
        *self.change.lock() = None;
        info!(phone = %updated.phone_number, "mobile number changed");
        Ok(updated)
    }

    fn require_access_token(&self) -> Result<String> {
        match self.sessions.token()? {
            Some(token) if !token.is_expired() => Ok(token.access_token),
            _ => Err(Error::TokenExpired),
        }
    }

    // Token first, then profile; tear both down if either write fails so
    // the device never holds credentials the flow did not complete for.
    fn persist_grant(&self, grant: LoginGrant) -> Result<AuthToken> {
        let token = AuthToken::new(
            grant.access_token,
            grant.refresh_token,
            grant.token_type,
            grant.expires_in,
            grant.user_id,
        );
        if let Err(e) = self.sessions.save_token(&token) {
            warn!(error = %e, "token persistence failed, tearing session down");
            if let Err(clear_err) = self.sessions.clear_all() {
                warn!(error = %clear_err, "session teardown also failed");
            }
            return Err(e.into());
        }
        if let Err(e) = self
            .profile
            .set(&grant.profile, Utc::now().timestamp_millis())
        {
            warn!(error = %e, "profile persistence failed, tearing session down");
            if let Err(clear_err) = self.sessions.clear_all() {
                warn!(error = %clear_err, "session teardown also failed");
            }
            if let Err(clear_err) = self.profile.clear() {
                warn!(error = %clear_err, "profile teardown also failed");
            }
            return Err(e.into());
        }
        Ok(token)
    }
}
