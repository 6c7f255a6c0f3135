//! Error types for the Lenda client core
//!
//! One taxonomy crosses every layer boundary so callers can branch on kind
//! without string matching. Storage and sync internals convert into these
//! variants at their crate edges.

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Lenda client errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected locally before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote call failed or the API reported a failure
    #[error("Network error: {0}")]
    Network(String),

    /// Encryption, decryption, or key-provisioning failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The access token's lifetime has elapsed
    #[error("Token expired")]
    TokenExpired,

    /// The one-time password's validity window has elapsed
    #[error("OTP expired")]
    OtpExpired,

    /// OTP verification attempts are exhausted
    #[error("Maximum OTP attempts exceeded")]
    MaxAttemptsExceeded,

    /// The operation was abandoned by its caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Persistence or other internal failure
    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::OtpExpired
                | Error::MaxAttemptsExceeded
                | Error::TokenExpired
        )
    }

    /// Whether retrying the same call later can plausibly succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::Network(_) => {
                "Unable to reach the service. Please check your connection and try again."
                    .to_string()
            }
            Error::TokenExpired => "Your session has expired. Please log in again.".to_string(),
            Error::OtpExpired => {
                "The verification code has expired. Please request a new one.".to_string()
            }
            Error::MaxAttemptsExceeded => {
                "Too many incorrect codes. Please request a new verification code.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Network(_) => ErrorCategory::Network,
            Error::Crypto(_) => ErrorCategory::Crypto,
            Error::TokenExpired | Error::OtpExpired | Error::MaxAttemptsExceeded => {
                ErrorCategory::Auth
            }
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Unknown(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input validation errors
    Validation,
    /// Network/API errors
    Network,
    /// Encryption and key-store errors
    Crypto,
    /// Session and credential lifecycle errors
    Auth,
    /// Caller-driven cancellation
    Cancelled,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "Validation"),
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Crypto => write!(f, "Crypto"),
            ErrorCategory::Auth => write!(f, "Auth"),
            ErrorCategory::Cancelled => write!(f, "Cancelled"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_detection() {
        assert!(Error::Validation("test".to_string()).is_user_error());
        assert!(Error::OtpExpired.is_user_error());
        assert!(Error::MaxAttemptsExceeded.is_user_error());
        assert!(!Error::Network("test".to_string()).is_user_error());
        assert!(!Error::Crypto("test".to_string()).is_user_error());
        assert!(!Error::Unknown("test".to_string()).is_user_error());
    }

    #[test]
    fn test_retriable_detection() {
        assert!(Error::Network("timeout".to_string()).is_retriable());
        assert!(!Error::Validation("bad phone".to_string()).is_retriable());
        assert!(!Error::Crypto("bad tag".to_string()).is_retriable());
    }

    #[test]
    fn test_user_messages() {
        let msg = Error::Validation("PIN must contain digits only".to_string()).user_message();
        assert_eq!(msg, "PIN must contain digits only");

        let msg = Error::TokenExpired.user_message();
        assert!(msg.contains("log in again"));

        let msg = Error::MaxAttemptsExceeded.user_message();
        assert!(msg.contains("Too many incorrect codes"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::Validation("test".to_string()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::Network("test".to_string()).category(),
            ErrorCategory::Network
        );
        assert_eq!(Error::TokenExpired.category(), ErrorCategory::Auth);
        assert_eq!(Error::OtpExpired.category(), ErrorCategory::Auth);
        assert_eq!(
            Error::Unknown("test".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "Validation");
        assert_eq!(ErrorCategory::Auth.to_string(), "Auth");
        assert_eq!(ErrorCategory::Network.to_string(), "Network");
    }
}
