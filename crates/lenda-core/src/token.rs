//! Access/refresh token pair and its lifetime arithmetic
//!
//! All expiry math is in epoch milliseconds against an explicit `now` so the
//! boundary behavior is testable without a real clock. A token is expired
//! exactly when `now >= created_at + expires_in * 1000`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How long before expiry a token counts as "needs refresh" (seconds).
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

/// Bearer token pair issued at login and rotated on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// Opaque bearer credential sent on authenticated calls
    pub access_token: String,
    /// Credential used to obtain a replacement pair
    pub refresh_token: String,
    /// Scheme label from the issuer, e.g. "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Account the pair was issued to
    pub user_id: String,
    /// Issue instant in epoch milliseconds
    pub created_at: i64,
}

impl AuthToken {
    /// Build a token pair issued now.
    pub fn new(
        access_token: String,
        refresh_token: String,
        token_type: String,
        expires_in: i64,
        user_id: String,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            user_id,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Instant (epoch ms) at which the access token stops being valid.
    pub fn expires_at(&self) -> i64 {
        self.created_at
            .saturating_add(self.expires_in.saturating_mul(1000))
    }

    /// Expiry check against an explicit clock value.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at()
    }

    /// Expiry check against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Whether the token is inside the pre-expiry refresh window.
    ///
    /// True from `buffer_secs` before expiry onwards, including after the
    /// token has fully expired.
    pub fn needs_refresh_at(&self, now_ms: i64, buffer_secs: i64) -> bool {
        let threshold = self
            .expires_at()
            .saturating_sub(buffer_secs.saturating_mul(1000));
        now_ms >= threshold
    }

    /// Refresh-window check against the wall clock.
    pub fn needs_refresh(&self, buffer_secs: i64) -> bool {
        self.needs_refresh_at(Utc::now().timestamp_millis(), buffer_secs)
    }

    /// Build the replacement pair issued by a refresh.
    ///
    /// Every credential field comes from the refresh response; the account
    /// identity carries over from the pair being replaced.
    pub fn rotated(
        &self,
        access_token: String,
        refresh_token: String,
        token_type: String,
        expires_in: i64,
        created_at: i64,
    ) -> AuthToken {
        AuthToken {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            user_id: self.user_id.clone(),
            created_at,
        }
    }
}

// Token strings are credentials; keep them out of debug/trace output.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(created_at: i64, expires_in: i64) -> AuthToken {
        AuthToken {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
            user_id: "user-1".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let t0 = 1_700_000_000_000;
        let token = token_at(t0, 3600);

        assert!(!token.is_expired_at(t0 + 3_599_000));
        assert!(!token.is_expired_at(t0 + 3_599_999));
        // Expiry is inclusive at exactly created_at + expires_in * 1000.
        assert!(token.is_expired_at(t0 + 3_600_000));
        assert!(token.is_expired_at(t0 + 3_600_001));
    }

    #[test]
    fn test_zero_lifetime_is_immediately_expired() {
        let t0 = 1_700_000_000_000;
        let token = token_at(t0, 0);
        assert!(token.is_expired_at(t0));
    }

    #[test]
    fn test_refresh_window() {
        let t0 = 1_700_000_000_000;
        let token = token_at(t0, 3600);

        // Window opens 300s before expiry, at t0 + 3300s.
        assert!(!token.needs_refresh_at(t0 + 3_299_999, DEFAULT_REFRESH_BUFFER_SECS));
        assert!(token.needs_refresh_at(t0 + 3_300_000, DEFAULT_REFRESH_BUFFER_SECS));
        // Still true once fully expired.
        assert!(token.needs_refresh_at(t0 + 4_000_000, DEFAULT_REFRESH_BUFFER_SECS));
    }

    #[test]
    fn test_rotated_keeps_identity_and_replaces_credentials() {
        let t0 = 1_700_000_000_000;
        let old = token_at(t0, 3600);
        let new = old.rotated(
            "access-2".to_string(),
            "refresh-2".to_string(),
            "Bearer".to_string(),
            7200,
            t0 + 3_500_000,
        );

        assert_eq!(new.user_id, "user-1");
        assert_eq!(new.access_token, "access-2");
        assert_eq!(new.refresh_token, "refresh-2");
        assert_eq!(new.expires_in, 7200);
        assert_eq!(new.created_at, t0 + 3_500_000);
        assert!(!new.is_expired_at(t0 + 3_600_001));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mut token = token_at(0, 3600);
        token.access_token = "top-secret-bearer".to_string();
        token.refresh_token = "top-secret-refresh".to_string();
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("top-secret-bearer"));
        assert!(!rendered.contains("top-secret-refresh"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("user-1"));
    }
}
