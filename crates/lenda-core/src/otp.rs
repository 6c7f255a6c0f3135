//! One-time-password session bookkeeping
//!
//! The session tracks everything needed to gate a verify call locally:
//! validity window, attempt ceiling, and whether the code was already
//! consumed. Verification must check `can_retry_at` before touching the
//! network so an exhausted or expired session never produces remote traffic.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default OTP validity window in milliseconds (5 minutes).
pub const DEFAULT_OTP_TTL_MS: i64 = 300_000;

/// Default verification attempt ceiling.
pub const DEFAULT_MAX_OTP_ATTEMPTS: u32 = 3;

/// State of one issued OTP challenge.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSession {
    /// Server-issued challenge identifier
    pub id: String,
    /// Normalized phone number the code was sent to
    pub phone_number: String,
    /// Code echoed back by development builds of the service, absent in
    /// production responses
    pub otp_code: Option<String>,
    /// Issue instant in epoch milliseconds
    pub created_at: i64,
    /// Instant the code stops being accepted, epoch milliseconds
    pub expires_at: i64,
    /// Set once a verify succeeded; the session is then spent
    pub is_used: bool,
    /// Verify calls recorded against this session
    pub attempts: u32,
    /// Ceiling on verify calls
    pub max_attempts: u32,
}

impl OtpSession {
    /// Build a session for a freshly issued challenge.
    pub fn new(
        id: String,
        phone_number: String,
        otp_code: Option<String>,
        created_at: i64,
        ttl_ms: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            id,
            phone_number,
            otp_code,
            created_at,
            expires_at: created_at.saturating_add(ttl_ms),
            is_used: false,
            attempts: 0,
            max_attempts,
        }
    }

    /// Expiry check against an explicit clock value.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Expiry check against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Whether any verify attempts remain.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Attempts left before the session locks.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Whether a verify call may proceed: not spent, not expired, and at
    /// least one attempt remaining.
    pub fn can_retry_at(&self, now_ms: i64) -> bool {
        !self.is_used && !self.is_expired_at(now_ms) && self.has_attempts_remaining()
    }

    /// `can_retry_at` against the wall clock.
    pub fn can_retry(&self) -> bool {
        self.can_retry_at(Utc::now().timestamp_millis())
    }

    /// Record one verify call against the ceiling.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Mark the code as consumed after a successful verify.
    pub fn mark_used(&mut self) {
        self.is_used = true;
    }
}

// The echoed code must never reach logs, even from dev builds.
impl fmt::Debug for OtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpSession")
            .field("id", &self.id)
            .field("phone_number", &self.phone_number)
            .field("otp_code", &self.otp_code.as_ref().map(|_| "<redacted>"))
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_used", &self.is_used)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(created_at: i64) -> OtpSession {
        OtpSession::new(
            "otp-1".to_string(),
            "+254700000001".to_string(),
            None,
            created_at,
            DEFAULT_OTP_TTL_MS,
            DEFAULT_MAX_OTP_ATTEMPTS,
        )
    }

    #[test]
    fn test_expiry_window() {
        let t0 = 1_700_000_000_000;
        let session = session_at(t0);

        assert!(!session.is_expired_at(t0));
        assert!(!session.is_expired_at(t0 + DEFAULT_OTP_TTL_MS - 1));
        assert!(session.is_expired_at(t0 + DEFAULT_OTP_TTL_MS));
    }

    #[test]
    fn test_attempt_ceiling() {
        let t0 = 1_700_000_000_000;
        let mut session = session_at(t0);

        assert_eq!(session.remaining_attempts(), 3);
        for expected_remaining in [2, 1, 0] {
            assert!(session.can_retry_at(t0 + 1));
            session.record_attempt();
            assert_eq!(session.remaining_attempts(), expected_remaining);
        }

        // Ceiling reached: no further retries regardless of the clock.
        assert!(!session.has_attempts_remaining());
        assert!(!session.can_retry_at(t0 + 1));
    }

    #[test]
    fn test_used_session_is_terminal() {
        let t0 = 1_700_000_000_000;
        let mut session = session_at(t0);
        session.record_attempt();
        session.mark_used();

        assert!(session.has_attempts_remaining());
        assert!(!session.can_retry_at(t0 + 1));
    }

    #[test]
    fn test_expired_session_blocks_retry_with_attempts_left() {
        let t0 = 1_700_000_000_000;
        let session = session_at(t0);

        assert!(session.has_attempts_remaining());
        assert!(!session.can_retry_at(t0 + DEFAULT_OTP_TTL_MS + 1));
    }

    #[test]
    fn test_debug_redacts_echoed_code() {
        let mut session = session_at(0);
        session.otp_code = Some("493217".to_string());
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("493217"));
        assert!(rendered.contains("<redacted>"));
    }
}
