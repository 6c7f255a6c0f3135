//! Domain payloads exchanged with the remote service and held in caches
//!
//! Monetary amounts are integer minor units (cents) alongside an ISO-4217
//! currency code. Instants are epoch milliseconds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account profile as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable account identifier
    pub user_id: String,
    /// Display name
    pub full_name: String,
    /// Normalized phone number the account is bound to
    pub phone_number: String,
    /// Contact email, if provided
    pub email: Option<String>,
    /// Government ID number, if KYC has captured one
    pub national_id: Option<String>,
    /// Whether identity verification has completed
    pub kyc_verified: bool,
}

/// Envelope for any cached payload plus the instant it was last brought in
/// sync with the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResource<T> {
    /// The cached payload
    pub payload: T,
    /// Epoch ms of the last successful sync for this payload
    pub last_synced_at: i64,
}

impl<T> CachedResource<T> {
    /// Wrap a payload synced at `last_synced_at`.
    pub fn new(payload: T, last_synced_at: i64) -> Self {
        Self {
            payload,
            last_synced_at,
        }
    }

    /// Whether the payload is still within its freshness window.
    pub fn is_fresh_at(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_synced_at) < ttl_ms
    }
}

/// Lifecycle of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Application received, not yet decided
    Pending,
    /// Approved, awaiting disbursement
    Approved,
    /// Disbursed and being repaid
    Active,
    /// Application declined
    Rejected,
    /// Fully repaid
    Settled,
    /// Past due
    Overdue,
}

impl LoanStatus {
    /// Stable string form used in cache rows and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Settled => "settled",
            LoanStatus::Overdue => "overdue",
        }
    }
}

/// One loan on the account, requested or disbursed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// Service-side loan identifier
    pub id: String,
    /// Product the loan was taken under
    pub product_id: String,
    /// Disbursed principal in minor units
    pub principal_minor: i64,
    /// Remaining balance in minor units
    pub outstanding_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Current lifecycle state
    pub status: LoanStatus,
    /// When the application was made, epoch ms
    pub applied_at: i64,
    /// Next or final due instant, epoch ms, absent for settled loans
    pub due_at: Option<i64>,
}

/// A loan product on offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanProduct {
    /// Catalog identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Marketing copy shown on the product page
    pub description: String,
    /// Smallest amount offered, minor units
    pub min_amount_minor: i64,
    /// Largest amount offered, minor units
    pub max_amount_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Shortest term in months
    pub min_term_months: u32,
    /// Longest term in months
    pub max_term_months: u32,
    /// Annual interest rate, percent
    pub annual_rate_pct: f64,
}

/// A loan application, complete or in progress.
///
/// `answers` holds the dynamic section driven by the service's form
/// metadata, keyed by field id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    /// Client-generated identifier, stable across draft saves
    pub application_id: String,
    /// Product applied for
    pub product_id: String,
    /// Requested amount in minor units
    pub amount_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Requested term in months
    pub term_months: u32,
    /// Dynamic form answers keyed by field id
    pub answers: serde_json::Value,
}

impl LoanApplication {
    /// Start a blank application for a product.
    pub fn new(product_id: String, currency: String) -> Self {
        Self {
            application_id: Uuid::new_v4().to_string(),
            product_id,
            amount_minor: 0,
            currency,
            term_months: 0,
            answers: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// A locally saved, not yet submitted application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Mirrors `application.application_id`; the draft's storage key
    pub application_id: String,
    /// Account the draft belongs to
    pub user_id: String,
    /// The in-progress application
    pub application: LoanApplication,
    /// Last local save instant, epoch ms
    pub updated_at: i64,
}

impl Draft {
    /// Wrap an application as a draft owned by `user_id`.
    pub fn new(user_id: String, application: LoanApplication, updated_at: i64) -> Self {
        Self {
            application_id: application.application_id.clone(),
            user_id,
            application,
            updated_at,
        }
    }
}

/// Acknowledgment returned when an application is accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// The application the receipt acknowledges
    pub application_id: String,
    /// Service-side tracking reference
    pub reference: String,
    /// When the service recorded the submission, epoch ms
    pub received_at: i64,
}

/// Lifecycle of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Accepted, not yet settled
    Pending,
    /// Settled
    Completed,
    /// Could not be settled
    Failed,
    /// Settled then reversed
    Reversed,
}

impl PaymentStatus {
    /// Stable string form used in cache rows and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Reversed => "reversed",
        }
    }
}

/// A payment category (biller grouping) from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCategory {
    /// Catalog identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional descriptive copy
    pub description: Option<String>,
}

/// One payment on the account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Service-side payment identifier
    pub id: String,
    /// Category the payment was made under
    pub category_id: String,
    /// Amount in minor units
    pub amount_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Current lifecycle state
    pub status: PaymentStatus,
    /// Receipt reference shown to the user
    pub reference: String,
    /// Settlement instant, epoch ms
    pub paid_at: i64,
}

/// Instruction to make a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Category to pay under
    pub category_id: String,
    /// Target account or biller reference
    pub target_account: String,
    /// Amount in minor units
    pub amount_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Free-text note, if any
    pub note: Option<String>,
}

/// Acknowledgment for a submitted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Service-side payment identifier
    pub payment_id: String,
    /// Receipt reference shown to the user
    pub reference: String,
    /// State at acknowledgment time
    pub status: PaymentStatus,
    /// When the service recorded the payment, epoch ms
    pub completed_at: i64,
}

/// Aggregated account figures for the home screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Total outstanding across active loans, minor units
    pub outstanding_minor: i64,
    /// Credit still available to draw, minor units
    pub available_credit_minor: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Count of loans currently active
    pub active_loans: u32,
    /// Next repayment due instant, epoch ms, if any
    pub next_due_at: Option<i64>,
    /// Next repayment amount, minor units, if any
    pub next_due_minor: Option<i64>,
}

/// Kinds of field the application form can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFieldKind {
    /// Free text
    Text,
    /// Numeric entry
    Number,
    /// Calendar date
    Date,
    /// Single choice from `options`
    Select,
}

/// One field of the dynamic application form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Field id, the key used in `LoanApplication::answers`
    pub id: String,
    /// Label shown to the user
    pub label: String,
    /// Widget kind
    pub kind: FormFieldKind,
    /// Whether the form cannot be submitted without it
    pub required: bool,
    /// Choices for `Select` fields, empty otherwise
    #[serde(default)]
    pub options: Vec<String>,
}

/// One titled section of the application form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSection {
    /// Section id
    pub id: String,
    /// Heading shown to the user
    pub title: String,
    /// Fields in display order
    pub fields: Vec<FormField>,
}

/// Versioned description of the loan application form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormMetadata {
    /// Monotonic version issued by the service
    pub version: u32,
    /// Sections in display order
    pub sections: Vec<FormSection>,
}
