//! Lenda client domain core
//!
//! This crate implements the domain model shared by the storage and sync
//! layers: session and token lifecycles, loan/payment/profile payloads,
//! cacheable resource kinds, and input validation. It is deliberately free
//! of I/O so every rule in it can be tested with a plain clock value.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod otp;
pub mod resource;
pub mod token;
pub mod validation;

pub use error::{Error, ErrorCategory, Result};
pub use models::{
    CachedResource, DashboardSummary, Draft, FormField, FormFieldKind, FormMetadata,
    FormSection, LoanApplication, LoanProduct, LoanRecord, LoanStatus, PaymentCategory,
    PaymentReceipt, PaymentRecord, PaymentRequest, PaymentStatus, SubmissionReceipt,
    UserProfile,
};
pub use otp::{OtpSession, DEFAULT_MAX_OTP_ATTEMPTS, DEFAULT_OTP_TTL_MS};
pub use resource::ResourceKind;
pub use token::{AuthToken, DEFAULT_REFRESH_BUFFER_SECS};
pub use validation::{normalize_phone, validate_phone, validate_pin, PIN_LENGTH};
