use std::fmt;

use crate::domain::BuyerInfo;

pub const BUYER_NAME_MAX_LEN: usize = 100;
pub const BUYER_EMAIL_MAX_LEN: usize = 254;
pub const BUYER_PHONE_MIN_DIGITS: usize = 8;
pub const BUYER_PHONE_MAX_DIGITS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    validate_required("email", email)?;
    validate_max_len("email", email, BUYER_EMAIL_MAX_LEN)?;

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email", "must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ValidationError::new("email", "is not a valid address"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("email", "must not contain spaces"));
    }

    Ok(())
}

/// Accepts digits with an optional leading `+`; spaces, dots and dashes are
/// stripped first.
pub fn normalize_phone(phone: &str) -> Result<String, ValidationError> {
    let compact: String = phone
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '.'))
        .collect();
    validate_required("phone", &compact)?;

    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }
    if !(BUYER_PHONE_MIN_DIGITS..=BUYER_PHONE_MAX_DIGITS).contains(&digits.len()) {
        return Err(ValidationError::new(
            "phone",
            format!(
                "must have between {} and {} digits",
                BUYER_PHONE_MIN_DIGITS, BUYER_PHONE_MAX_DIGITS
            ),
        ));
    }

    Ok(compact)
}

/// Sanitizes and validates the buyer snapshot, returning the stored form.
pub fn validate_buyer(buyer: &BuyerInfo) -> Result<BuyerInfo, ValidationError> {
    let name = sanitize_string(&buyer.name);
    validate_required("name", &name)?;
    validate_max_len("name", &name, BUYER_NAME_MAX_LEN)?;

    let email = buyer.email.trim().to_lowercase();
    validate_email(&email)?;

    let phone = normalize_phone(buyer.phone.trim())?;

    Ok(BuyerInfo { name, phone, email })
}
