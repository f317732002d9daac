//! Request validation utilities.
//!
//! Key identifiers are not checked against the generated format: the key
//! document may be edited by hand, so any reasonable identifier is looked up.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
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

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

pub const MAX_KEY_LENGTH: usize = 128;
pub const MAX_HWID_LENGTH: usize = 256;
pub const MAX_NOTE_LENGTH: usize = 500;

fn key_id_regex() -> &'static Regex {
    static KEY_ID_RE: OnceLock<Regex> = OnceLock::new();
    KEY_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use checkkey::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "key").is_ok());
/// assert!(validate_not_empty("   ", "key").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate that a string does not exceed `max` characters.
pub fn validate_length(value: &str, field_name: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {max} characters"),
        ))
    } else {
        Ok(())
    }
}

/// Validate a key identifier: letters, digits, `-` and `_` only.
///
/// # Example
/// ```
/// use checkkey::server::validation::validate_key_id;
///
/// assert!(validate_key_id("7DAY-CHECKKEY-K3M9Q2ZX7RTA", "key").is_ok());
/// assert!(validate_key_id("7DAY CHECKKEY", "key").is_err());
/// ```
pub fn validate_key_id(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, field_name, MAX_KEY_LENGTH)?;

    if key_id_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "may only contain letters, digits, '-' and '_'",
        ))
    }
}

/// Validate a hardware ID: non-empty, bounded, no control characters.
pub fn validate_hwid(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, field_name, MAX_HWID_LENGTH)?;

    if value.chars().any(char::is_control) {
        return Err(ValidationError::new(
            field_name,
            "must not contain control characters",
        ));
    }
    Ok(())
}

/// Validate an optional free-text note or reason.
pub fn validate_note(value: Option<&str>, field_name: &str) -> ValidationResult<()> {
    match value {
        Some(v) => validate_length(v, field_name, MAX_NOTE_LENGTH),
        None => Ok(()),
    }
}
