//! Scripted remote service
//!
//! In-memory [`RemoteApi`] implementation for tests and the session
//! harness. It keeps real account state (users, OTP sessions, issued
//! tokens) so whole flows run against it, and it counts calls per method
//! so tests can assert that local gates kept the network out of a path.

use crate::api::{
    ApiResponse, ChangeTicket, LoginGrant, OtpChallenge, RemoteApi, TokenRefresh, VerifiedOtp,
};
use async_trait::async_trait;
use chrono::Utc;
use lenda_core::{
    DashboardSummary, FormField, FormFieldKind, FormMetadata, FormSection, LoanApplication,
    LoanProduct, LoanRecord, LoanStatus, PaymentCategory, PaymentReceipt, PaymentRecord,
    PaymentRequest, PaymentStatus, SubmissionReceipt, UserProfile, DEFAULT_MAX_OTP_ATTEMPTS,
    DEFAULT_OTP_TTL_MS,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use uuid::Uuid;

struct MockUser {
    phone: String,
    pin: String,
    profile: UserProfile,
}

struct PendingOtp {
    phone: String,
    code: String,
    expires_at_ms: i64,
}

#[derive(Default)]
struct MockState {
    users: HashMap<String, MockUser>,
    phone_index: HashMap<String, String>,
    otp_sessions: HashMap<String, PendingOtp>,
    change_sessions: HashMap<String, PendingOtp>,
    temp_tokens: HashMap<String, String>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    change_tickets: HashMap<String, (String, String)>,
    loans: HashMap<String, Vec<LoanRecord>>,
    payments: HashMap<String, Vec<PaymentRecord>>,
    dashboards: HashMap<String, DashboardSummary>,
    products: Vec<LoanProduct>,
    categories: Vec<PaymentCategory>,
    form: Option<FormMetadata>,
    user_seq: u32,
    record_seq: u32,
}

/// Scripted in-memory remote service.
pub struct MockRemoteApi {
    state: Mutex<MockState>,
    offline: AtomicBool,
    loading: AtomicBool,
    otp_code: Mutex<String>,
    otp_ttl_ms: AtomicI64,
    max_otp_attempts: AtomicU32,
    token_ttl_secs: AtomicI64,
    calls: Mutex<HashMap<&'static str, u32>>,
}

impl MockRemoteApi {
    /// A reachable service with default fixtures and no accounts.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                products: default_products(),
                categories: default_categories(),
                form: Some(default_form()),
                ..MockState::default()
            }),
            offline: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            otp_code: Mutex::new("123456".to_string()),
            otp_ttl_ms: AtomicI64::new(DEFAULT_OTP_TTL_MS),
            max_otp_attempts: AtomicU32::new(DEFAULT_MAX_OTP_ATTEMPTS),
            token_ttl_secs: AtomicI64::new(3_600),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create an account directly, skipping the OTP flow. Returns the
    /// user id.
    pub fn register_user(&self, phone: &str, pin: &str, full_name: &str) -> String {
        let mut state = self.state.lock();
        state.user_seq += 1;
        let user_id = format!("user-{}", state.user_seq);
        let profile = UserProfile {
            user_id: user_id.clone(),
            full_name: full_name.to_string(),
            phone_number: phone.to_string(),
            email: None,
            national_id: None,
            kyc_verified: false,
        };
        state.phone_index.insert(phone.to_string(), user_id.clone());
        state.users.insert(
            user_id.clone(),
            MockUser {
                phone: phone.to_string(),
                pin: pin.to_string(),
                profile,
            },
        );
        user_id
    }

    /// Make every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every call report the in-flight marker.
    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    /// The code the service "sends" for every challenge.
    pub fn otp_code(&self) -> String {
        self.otp_code.lock().clone()
    }

    /// Change the dispatched OTP code.
    pub fn set_otp_code(&self, code: &str) {
        *self.otp_code.lock() = code.to_string();
    }

    /// Change the challenge lifetime.
    pub fn set_otp_ttl_ms(&self, ttl_ms: i64) {
        self.otp_ttl_ms.store(ttl_ms, Ordering::SeqCst);
    }

    /// Change the advertised attempt budget.
    pub fn set_max_otp_attempts(&self, max_attempts: u32) {
        self.max_otp_attempts.store(max_attempts, Ordering::SeqCst);
    }

    /// Change the lifetime of issued access tokens.
    pub fn set_token_ttl_secs(&self, secs: i64) {
        self.token_ttl_secs.store(secs, Ordering::SeqCst);
    }

    /// How many times `method` was called (gated calls included).
    pub fn calls(&self, method: &str) -> u32 {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Replace the loan fixtures for `user_id`.
    pub fn set_loans(&self, user_id: &str, loans: Vec<LoanRecord>) {
        self.state.lock().loans.insert(user_id.to_string(), loans);
    }

    /// Replace the payment fixtures for `user_id`.
    pub fn set_payments(&self, user_id: &str, payments: Vec<PaymentRecord>) {
        self.state
            .lock()
            .payments
            .insert(user_id.to_string(), payments);
    }

    /// Replace the dashboard fixture for `user_id`.
    pub fn set_dashboard(&self, user_id: &str, dashboard: DashboardSummary) {
        self.state
            .lock()
            .dashboards
            .insert(user_id.to_string(), dashboard);
    }

    /// Replace the product catalog.
    pub fn set_products(&self, products: Vec<LoanProduct>) {
        self.state.lock().products = products;
    }

    fn bump(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_insert(0) += 1;
    }

    fn gate<T>(&self, method: &'static str) -> Option<ApiResponse<T>> {
        self.bump(method);
        if self.loading.load(Ordering::SeqCst) {
            return Some(ApiResponse::Loading);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Some(ApiResponse::Error("network unreachable".to_string()));
        }
        None
    }

    fn issue_grant(&self, state: &mut MockState, user_id: &str) -> LoginGrant {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        state
            .access_tokens
            .insert(access_token.clone(), user_id.to_string());
        state
            .refresh_tokens
            .insert(refresh_token.clone(), user_id.to_string());
        let profile = state.users[user_id].profile.clone();
        LoginGrant {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl_secs.load(Ordering::SeqCst),
            user_id: user_id.to_string(),
            profile,
        }
    }
}

impl Default for MockRemoteApi {
    fn default() -> Self {
        Self::new()
    }
}

fn authorize(state: &MockState, access_token: &str) -> Option<String> {
    state.access_tokens.get(access_token).cloned()
}

fn unauthorized<T>() -> ApiResponse<T> {
    ApiResponse::Error("unauthorized".to_string())
}

fn default_products() -> Vec<LoanProduct> {
    vec![
        LoanProduct {
            id: "prod-flexi".to_string(),
            name: "Flexi Loan".to_string(),
            description: "Short-term cash for everyday needs".to_string(),
            min_amount_minor: 50_000,
            max_amount_minor: 5_000_000,
            currency: "KES".to_string(),
            min_term_months: 1,
            max_term_months: 12,
            annual_rate_pct: 14.5,
        },
        LoanProduct {
            id: "prod-biashara".to_string(),
            name: "Biashara Boost".to_string(),
            description: "Working capital for small businesses".to_string(),
            min_amount_minor: 500_000,
            max_amount_minor: 30_000_000,
            currency: "KES".to_string(),
            min_term_months: 3,
            max_term_months: 24,
            annual_rate_pct: 12.0,
        },
    ]
}

fn default_categories() -> Vec<PaymentCategory> {
    vec![
        PaymentCategory {
            id: "cat-electricity".to_string(),
            name: "Electricity".to_string(),
            description: Some("Prepaid and postpaid power".to_string()),
        },
        PaymentCategory {
            id: "cat-water".to_string(),
            name: "Water".to_string(),
            description: None,
        },
    ]
}

fn default_form() -> FormMetadata {
    FormMetadata {
        version: 1,
        sections: vec![FormSection {
            id: "applicant".to_string(),
            title: "About you".to_string(),
            fields: vec![
                FormField {
                    id: "monthly_income".to_string(),
                    label: "Monthly income".to_string(),
                    kind: FormFieldKind::Number,
                    required: true,
                    options: vec![],
                },
                FormField {
                    id: "employment".to_string(),
                    label: "Employment status".to_string(),
                    kind: FormFieldKind::Select,
                    required: true,
                    options: vec![
                        "employed".to_string(),
                        "self_employed".to_string(),
                        "student".to_string(),
                    ],
                },
            ],
        }],
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn send_otp(&self, phone: &str) -> ApiResponse<OtpChallenge> {
        if let Some(resp) = self.gate("send_otp") {
            return resp;
        }
        let now_ms = Utc::now().timestamp_millis();
        let session_id = Uuid::new_v4().to_string();
        let expires_at_ms = now_ms + self.otp_ttl_ms.load(Ordering::SeqCst);
        self.state.lock().otp_sessions.insert(
            session_id.clone(),
            PendingOtp {
                phone: phone.to_string(),
                code: self.otp_code.lock().clone(),
                expires_at_ms,
            },
        );
        ApiResponse::Success(OtpChallenge {
            session_id,
            expires_at_ms,
            max_attempts: self.max_otp_attempts.load(Ordering::SeqCst),
        })
    }

    async fn verify_otp(&self, session_id: &str, code: &str) -> ApiResponse<VerifiedOtp> {
        if let Some(resp) = self.gate("verify_otp") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(pending) = state.otp_sessions.get(session_id) else {
            return ApiResponse::Error("unknown OTP session".to_string());
        };
        if Utc::now().timestamp_millis() >= pending.expires_at_ms {
            return ApiResponse::Error("OTP expired".to_string());
        }
        if pending.code != code {
            return ApiResponse::Error("incorrect code".to_string());
        }
        let phone = pending.phone.clone();
        state.otp_sessions.remove(session_id);

        let temp_token = Uuid::new_v4().to_string();
        let is_new_user = !state.phone_index.contains_key(&phone);
        state.temp_tokens.insert(temp_token.clone(), phone);
        ApiResponse::Success(VerifiedOtp {
            temp_token,
            is_new_user,
        })
    }

    async fn set_pin(&self, temp_token: &str, pin: &str) -> ApiResponse<LoginGrant> {
        if let Some(resp) = self.gate("set_pin") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(phone) = state.temp_tokens.remove(temp_token) else {
            return ApiResponse::Error("invalid temp token".to_string());
        };

        let user_id = match state.phone_index.get(&phone) {
            Some(existing) => existing.clone(),
            None => {
                state.user_seq += 1;
                let user_id = format!("user-{}", state.user_seq);
                let profile = UserProfile {
                    user_id: user_id.clone(),
                    full_name: String::new(),
                    phone_number: phone.clone(),
                    email: None,
                    national_id: None,
                    kyc_verified: false,
                };
                state.phone_index.insert(phone.clone(), user_id.clone());
                state.users.insert(
                    user_id.clone(),
                    MockUser {
                        phone: phone.clone(),
                        pin: String::new(),
                        profile,
                    },
                );
                user_id
            }
        };
        if let Some(user) = state.users.get_mut(&user_id) {
            user.pin = pin.to_string();
        }
        ApiResponse::Success(self.issue_grant(&mut state, &user_id))
    }

    async fn login(&self, phone: &str, pin: &str) -> ApiResponse<LoginGrant> {
        if let Some(resp) = self.gate("login") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = state.phone_index.get(phone).cloned() else {
            return ApiResponse::Error("invalid phone number or PIN".to_string());
        };
        if state.users[&user_id].pin != pin {
            return ApiResponse::Error("invalid phone number or PIN".to_string());
        }
        ApiResponse::Success(self.issue_grant(&mut state, &user_id))
    }

    async fn refresh_token(&self, refresh_token: &str) -> ApiResponse<TokenRefresh> {
        if let Some(resp) = self.gate("refresh_token") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = state.refresh_tokens.remove(refresh_token) else {
            return ApiResponse::Error("unknown refresh token".to_string());
        };
        let access_token = Uuid::new_v4().to_string();
        let new_refresh = Uuid::new_v4().to_string();
        state
            .access_tokens
            .insert(access_token.clone(), user_id.clone());
        state.refresh_tokens.insert(new_refresh.clone(), user_id);
        ApiResponse::Success(TokenRefresh {
            access_token,
            refresh_token: new_refresh,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl_secs.load(Ordering::SeqCst),
        })
    }

    async fn logout(&self, access_token: &str) -> ApiResponse<()> {
        if let Some(resp) = self.gate("logout") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = state.access_tokens.remove(access_token) else {
            return unauthorized();
        };
        state.refresh_tokens.retain(|_, owner| owner != &user_id);
        ApiResponse::Success(())
    }

    async fn get_profile(&self, access_token: &str) -> ApiResponse<UserProfile> {
        if let Some(resp) = self.gate("get_profile") {
            return resp;
        }
        let state = self.state.lock();
        match authorize(&state, access_token) {
            Some(user_id) => ApiResponse::Success(state.users[&user_id].profile.clone()),
            None => unauthorized(),
        }
    }

    async fn get_loans(&self, access_token: &str) -> ApiResponse<Vec<LoanRecord>> {
        if let Some(resp) = self.gate("get_loans") {
            return resp;
        }
        let state = self.state.lock();
        match authorize(&state, access_token) {
            Some(user_id) => {
                ApiResponse::Success(state.loans.get(&user_id).cloned().unwrap_or_default())
            }
            None => unauthorized(),
        }
    }

    async fn get_loan_products(&self) -> ApiResponse<Vec<LoanProduct>> {
        if let Some(resp) = self.gate("get_loan_products") {
            return resp;
        }
        ApiResponse::Success(self.state.lock().products.clone())
    }

    async fn get_form_metadata(&self) -> ApiResponse<FormMetadata> {
        if let Some(resp) = self.gate("get_form_metadata") {
            return resp;
        }
        match self.state.lock().form.clone() {
            Some(form) => ApiResponse::Success(form),
            None => ApiResponse::Error("form metadata unavailable".to_string()),
        }
    }

    async fn submit_application(
        &self,
        access_token: &str,
        application: &LoanApplication,
    ) -> ApiResponse<SubmissionReceipt> {
        if let Some(resp) = self.gate("submit_application") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = authorize(&state, access_token) else {
            return unauthorized();
        };
        let now_ms = Utc::now().timestamp_millis();
        state.record_seq += 1;
        let reference = format!("APP-{:06}", state.record_seq);
        let loan = LoanRecord {
            id: format!("loan-{}", state.record_seq),
            product_id: application.product_id.clone(),
            principal_minor: application.amount_minor,
            outstanding_minor: application.amount_minor,
            currency: application.currency.clone(),
            status: LoanStatus::Pending,
            applied_at: now_ms,
            due_at: None,
        };
        state.loans.entry(user_id).or_default().push(loan);
        ApiResponse::Success(SubmissionReceipt {
            application_id: application.application_id.clone(),
            reference,
            received_at: now_ms,
        })
    }

    async fn get_payments(&self, access_token: &str) -> ApiResponse<Vec<PaymentRecord>> {
        if let Some(resp) = self.gate("get_payments") {
            return resp;
        }
        let state = self.state.lock();
        match authorize(&state, access_token) {
            Some(user_id) => {
                ApiResponse::Success(state.payments.get(&user_id).cloned().unwrap_or_default())
            }
            None => unauthorized(),
        }
    }

    async fn get_payment_categories(&self) -> ApiResponse<Vec<PaymentCategory>> {
        if let Some(resp) = self.gate("get_payment_categories") {
            return resp;
        }
        ApiResponse::Success(self.state.lock().categories.clone())
    }

    async fn submit_payment(
        &self,
        access_token: &str,
        request: &PaymentRequest,
    ) -> ApiResponse<PaymentReceipt> {
        if let Some(resp) = self.gate("submit_payment") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = authorize(&state, access_token) else {
            return unauthorized();
        };
        let now_ms = Utc::now().timestamp_millis();
        state.record_seq += 1;
        let payment_id = format!("pay-{}", state.record_seq);
        let reference = format!("PAY-{:06}", state.record_seq);
        let record = PaymentRecord {
            id: payment_id.clone(),
            category_id: request.category_id.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            status: PaymentStatus::Completed,
            reference: reference.clone(),
            paid_at: now_ms,
        };
        state.payments.entry(user_id).or_default().push(record);
        ApiResponse::Success(PaymentReceipt {
            payment_id,
            reference,
            status: PaymentStatus::Completed,
            completed_at: now_ms,
        })
    }

    async fn get_dashboard(&self, access_token: &str) -> ApiResponse<DashboardSummary> {
        if let Some(resp) = self.gate("get_dashboard") {
            return resp;
        }
        let state = self.state.lock();
        match authorize(&state, access_token) {
            Some(user_id) => {
                ApiResponse::Success(state.dashboards.get(&user_id).cloned().unwrap_or(
                    DashboardSummary {
                        outstanding_minor: 0,
                        available_credit_minor: 0,
                        currency: "KES".to_string(),
                        active_loans: 0,
                        next_due_at: None,
                        next_due_minor: None,
                    },
                ))
            }
            None => unauthorized(),
        }
    }

    async fn start_mobile_change(
        &self,
        access_token: &str,
        new_phone: &str,
    ) -> ApiResponse<OtpChallenge> {
        if let Some(resp) = self.gate("start_mobile_change") {
            return resp;
        }
        let mut state = self.state.lock();
        if authorize(&state, access_token).is_none() {
            return unauthorized();
        }
        if state.phone_index.contains_key(new_phone) {
            return ApiResponse::Error("phone number already registered".to_string());
        }
        let now_ms = Utc::now().timestamp_millis();
        let session_id = Uuid::new_v4().to_string();
        let expires_at_ms = now_ms + self.otp_ttl_ms.load(Ordering::SeqCst);
        state.change_sessions.insert(
            session_id.clone(),
            PendingOtp {
                phone: new_phone.to_string(),
                code: self.otp_code.lock().clone(),
                expires_at_ms,
            },
        );
        ApiResponse::Success(OtpChallenge {
            session_id,
            expires_at_ms,
            max_attempts: self.max_otp_attempts.load(Ordering::SeqCst),
        })
    }

    async fn verify_mobile_change(
        &self,
        access_token: &str,
        session_id: &str,
        code: &str,
    ) -> ApiResponse<ChangeTicket> {
        if let Some(resp) = self.gate("verify_mobile_change") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = authorize(&state, access_token) else {
            return unauthorized();
        };
        let Some(pending) = state.change_sessions.get(session_id) else {
            return ApiResponse::Error("unknown change session".to_string());
        };
        if Utc::now().timestamp_millis() >= pending.expires_at_ms {
            return ApiResponse::Error("OTP expired".to_string());
        }
        if pending.code != code {
            return ApiResponse::Error("incorrect code".to_string());
        }
        let new_phone = pending.phone.clone();
        state.change_sessions.remove(session_id);

        let ticket_id = Uuid::new_v4().to_string();
        state
            .change_tickets
            .insert(ticket_id.clone(), (user_id, new_phone));
        ApiResponse::Success(ChangeTicket { ticket_id })
    }

    async fn confirm_mobile_change(
        &self,
        access_token: &str,
        ticket_id: &str,
        pin: &str,
    ) -> ApiResponse<UserProfile> {
        if let Some(resp) = self.gate("confirm_mobile_change") {
            return resp;
        }
        let mut state = self.state.lock();
        let Some(user_id) = authorize(&state, access_token) else {
            return unauthorized();
        };
        let Some((ticket_user, new_phone)) = state.change_tickets.remove(ticket_id) else {
            return ApiResponse::Error("unknown change ticket".to_string());
        };
        if ticket_user != user_id {
            return ApiResponse::Error("ticket does not belong to caller".to_string());
        }
        if state.users[&user_id].pin != pin {
            return ApiResponse::Error("incorrect PIN".to_string());
        }

        let old_phone = state.users[&user_id].phone.clone();
        state.phone_index.remove(&old_phone);
        state.phone_index.insert(new_phone.clone(), user_id.clone());
        let Some(user) = state.users.get_mut(&user_id) else {
            return unauthorized();
        };
        user.phone = new_phone.clone();
        user.profile.phone_number = new_phone;
        ApiResponse::Success(user.profile.clone())
    }
}
