//! Input validation for phone numbers and PINs
//!
//! Both checks run locally before any network call, so malformed input
//! never produces remote traffic. Phone numbers normalize to E.164 form
//! (`+` followed by country code and subscriber digits).

use crate::error::{Error, Result};

/// Required PIN length, digits only.
pub const PIN_LENGTH: usize = 4;

const E164_MIN_DIGITS: usize = 9;
const E164_MAX_DIGITS: usize = 15;

/// Normalize a phone number to E.164 form.
///
/// Accepts international form (`+254700000001`, `00254700000001`), local
/// form with a leading zero (`0700000001`), or bare digits already carrying
/// the country code. `country_code` is digits only, e.g. `"254"`.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if compact.is_empty() {
        return Err(Error::Validation("Phone number is empty".to_string()));
    }

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix('0') {
        format!("{country_code}{rest}")
    } else {
        compact
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation(
            "Phone number may only contain digits and a leading +".to_string(),
        ));
    }
    if digits.starts_with('0') {
        return Err(Error::Validation(
            "Phone number country code cannot start with 0".to_string(),
        ));
    }
    if digits.len() < E164_MIN_DIGITS || digits.len() > E164_MAX_DIGITS {
        return Err(Error::Validation(format!(
            "Phone number must have {E164_MIN_DIGITS}-{E164_MAX_DIGITS} digits, got {}",
            digits.len()
        )));
    }

    Ok(format!("+{digits}"))
}

/// Check a phone number without keeping the normalized form.
pub fn validate_phone(raw: &str, country_code: &str) -> Result<()> {
    normalize_phone(raw, country_code).map(|_| ())
}

/// Check a PIN against the policy: exact length, digits only, and not a
/// trivially guessable pattern.
pub fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() != PIN_LENGTH {
        return Err(Error::Validation(format!(
            "PIN must be exactly {PIN_LENGTH} digits"
        )));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("PIN must contain digits only".to_string()));
    }
    if is_trivial_pin(pin) {
        return Err(Error::Validation("PIN is too easy to guess".to_string()));
    }
    Ok(())
}

// All-same digits and straight ascending/descending runs.
fn is_trivial_pin(pin: &str) -> bool {
    let digits: Vec<i8> = pin.bytes().map(|b| (b - b'0') as i8).collect();
    let all_same = digits.windows(2).all(|w| w[0] == w[1]);
    let ascending = digits.windows(2).all(|w| w[1] == w[0] + 1);
    let descending = digits.windows(2).all(|w| w[1] == w[0] - 1);
    all_same || ascending || descending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_international_forms() {
        assert_eq!(
            normalize_phone("+254700000001", "254").unwrap(),
            "+254700000001"
        );
        assert_eq!(
            normalize_phone("00254700000001", "254").unwrap(),
            "+254700000001"
        );
        assert_eq!(
            normalize_phone("254700000001", "254").unwrap(),
            "+254700000001"
        );
    }

    #[test]
    fn test_normalize_local_form() {
        assert_eq!(
            normalize_phone("0700 000 001", "254").unwrap(),
            "+254700000001"
        );
        assert_eq!(
            normalize_phone("0700-000-001", "254").unwrap(),
            "+254700000001"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_phone("0700000001", "254").unwrap();
        let twice = normalize_phone(&once, "254").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rejects_malformed_phones() {
        assert!(normalize_phone("", "254").is_err());
        assert!(normalize_phone("not-a-number", "254").is_err());
        assert!(normalize_phone("+2547abc0001", "254").is_err());
        assert!(normalize_phone("+07000001", "254").is_err());
        assert!(normalize_phone("12345", "254").is_err());
        assert!(normalize_phone("+1234567890123456", "254").is_err());
    }

    #[test]
    fn test_pin_policy() {
        assert!(validate_pin("7294").is_ok());
        assert!(validate_pin("1357").is_ok());

        assert!(validate_pin("123").is_err());
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("").is_err());
    }

    #[test]
    fn test_pin_trivial_patterns_rejected() {
        assert!(validate_pin("0000").is_err());
        assert!(validate_pin("9999").is_err());
        assert!(validate_pin("1234").is_err());
        assert!(validate_pin("6789").is_err());
        assert!(validate_pin("4321").is_err());
        assert!(validate_pin("9876").is_err());
    }

    #[test]
    fn test_validation_errors_are_user_errors() {
        let err = validate_pin("0000").unwrap_err();
        assert!(err.is_user_error());
        let err = normalize_phone("abc", "254").unwrap_err();
        assert!(err.is_user_error());
    }
}
