//! Remote service seam
//!
//! Everything the client asks the service for goes through [`RemoteApi`].
//! Transport and wire format live behind the trait; the rest of the crate
//! only sees typed payloads and the tri-state [`ApiResponse`].

use crate::{Error, Result};
use async_trait::async_trait;
use lenda_core::{
    DashboardSummary, FormMetadata, LoanApplication, LoanProduct, LoanRecord, PaymentCategory,
    PaymentRecord, PaymentReceipt, PaymentRequest, SubmissionReceipt, UserProfile,
};

/// Outcome of one remote call.
///
/// `Loading` marks a collaborator that is still in flight (some transports
/// surface intermediate states); the core never waits on it and converts it
/// to a retriable network error at this seam.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    /// The call completed with a payload.
    Success(T),
    /// The call failed; the message is safe to show the user.
    Error(String),
    /// The call has not completed yet.
    Loading,
}

impl<T> ApiResponse<T> {
    /// Collapse the tri-state into a `Result`.
    pub fn into_result(self) -> Result<T> {
        match self {
            ApiResponse::Success(value) => Ok(value),
            ApiResponse::Error(message) => Err(Error::Network(message)),
            ApiResponse::Loading => Err(Error::Network("remote response still loading".to_string())),
        }
    }

    /// Whether the call completed with a payload.
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }
}

/// A dispatched OTP challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    /// Server-side session the verify call must reference.
    pub session_id: String,
    /// Instant the code stops being accepted, epoch milliseconds.
    pub expires_at_ms: i64,
    /// How many verify calls the service will accept.
    pub max_attempts: u32,
}

/// Result of a successful OTP verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedOtp {
    /// Short-lived token authorizing PIN setup for this phone number.
    pub temp_token: String,
    /// Whether the phone number has no account yet (PIN must be set).
    pub is_new_user: bool,
}

/// Credentials and profile handed out on successful authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    /// Bearer token for authorized calls.
    pub access_token: String,
    /// Token redeemable for a fresh grant.
    pub refresh_token: String,
    /// Scheme, normally `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Account the grant belongs to.
    pub user_id: String,
    /// Profile snapshot taken at sign-in.
    pub profile: UserProfile,
}

/// Replacement credentials from a refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefresh {
    /// New bearer token.
    pub access_token: String,
    /// New refresh token; the old one is spent.
    pub refresh_token: String,
    /// Scheme, normally `Bearer`.
    pub token_type: String,
    /// New access token lifetime in seconds.
    pub expires_in: i64,
}

/// Proof that the OTP step of a mobile-number change passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTicket {
    /// Opaque ticket the confirm call must present.
    pub ticket_id: String,
}

/// The remote service, one method per operation.
///
/// Implementations own transport, serialization, and authentication
/// headers. Methods taking `access_token` require a signed-in session.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Dispatch an OTP to `phone` (E.164).
    async fn send_otp(&self, phone: &str) -> ApiResponse<OtpChallenge>;

    /// Check `code` against the challenge `session_id`.
    async fn verify_otp(&self, session_id: &str, code: &str) -> ApiResponse<VerifiedOtp>;

    /// Set the account PIN for a freshly verified phone number.
    async fn set_pin(&self, temp_token: &str, pin: &str) -> ApiResponse<LoginGrant>;

    /// Authenticate with phone number and PIN.
    async fn login(&self, phone: &str, pin: &str) -> ApiResponse<LoginGrant>;

    /// Trade a refresh token for fresh credentials.
    async fn refresh_token(&self, refresh_token: &str) -> ApiResponse<TokenRefresh>;

    /// Invalidate the session server-side.
    async fn logout(&self, access_token: &str) -> ApiResponse<()>;

    /// The signed-in user's profile.
    async fn get_profile(&self, access_token: &str) -> ApiResponse<UserProfile>;

    /// The signed-in user's loans.
    async fn get_loans(&self, access_token: &str) -> ApiResponse<Vec<LoanRecord>>;

    /// The public loan product catalog.
    async fn get_loan_products(&self) -> ApiResponse<Vec<LoanProduct>>;

    /// The application form layout.
    async fn get_form_metadata(&self) -> ApiResponse<FormMetadata>;

    /// Submit a completed loan application.
    async fn submit_application(
        &self,
        access_token: &str,
        application: &LoanApplication,
    ) -> ApiResponse<SubmissionReceipt>;

    /// The signed-in user's payment history.
    async fn get_payments(&self, access_token: &str) -> ApiResponse<Vec<PaymentRecord>>;

    /// The public payment category catalog.
    async fn get_payment_categories(&self) -> ApiResponse<Vec<PaymentCategory>>;

    /// Execute a payment.
    async fn submit_payment(
        &self,
        access_token: &str,
        request: &PaymentRequest,
    ) -> ApiResponse<PaymentReceipt>;

    /// The signed-in user's dashboard summary.
    async fn get_dashboard(&self, access_token: &str) -> ApiResponse<DashboardSummary>;

    /// Begin a mobile-number change by sending an OTP to the new number.
    async fn start_mobile_change(
        &self,
        access_token: &str,
        new_phone: &str,
    ) -> ApiResponse<OtpChallenge>;

    /// Check the change OTP; a ticket comes back on success.
    async fn verify_mobile_change(
        &self,
        access_token: &str,
        session_id: &str,
        code: &str,
    ) -> ApiResponse<ChangeTicket>;

    /// Finish the change with a PIN re-check; returns the updated profile.
    async fn confirm_mobile_change(
        &self,
        access_token: &str,
        ticket_id: &str,
        pin: &str,
    ) -> ApiResponse<UserProfile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_collapses_to_ok() {
        let response = ApiResponse::Success(7);
        assert!(response.is_success());
        assert_eq!(response.into_result().unwrap(), 7);
    }

    #[test]
    fn test_error_collapses_to_network_error() {
        let response: ApiResponse<()> = ApiResponse::Error("service unavailable".to_string());
        match response.into_result() {
            Err(Error::Network(msg)) => assert_eq!(msg, "service unavailable"),
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[test]
    fn test_loading_is_a_retriable_network_error() {
        let response: ApiResponse<()> = ApiResponse::Loading;
        let err = response.into_result().unwrap_err();
        assert!(err.is_retriable());
        assert!(matches!(err, Error::Network(_)));
    }
}
