//! Standardized API error responses.
//!
//! Admin endpoints report failures with this JSON structure:
//!
//! ```json
//! {
//!   "success": false,
//!   "code": "KEY_NOT_FOUND",
//!   "message": "Key '7DAY-CHECKKEY-ABCDEFGHIJKL' not found"
//! }
//! ```
//!
//! The `details` field is optional and may name the offending field.
//! `/api/check` keeps its own `{status, msg}` shape but shares the codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::KeyError;
use crate::server::validation::ValidationError;
use crate::store::RejectReason;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Key State (check rejections) ===
    /// Key was not found in the store
    KeyNotFound,
    /// Key has been locked by an administrator
    KeyLocked,
    /// Key lease has run out
    KeyExpired,
    /// Key is bound to a different device
    HardwareMismatch,

    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Server Errors (5xx) ===
    /// Reading or writing the key document failed
    StorageError,
    /// Server configuration error
    ConfigError,
    /// External service communication failed
    NetworkError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::MissingField | ErrorCode::InvalidField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::KeyLocked | ErrorCode::KeyExpired | ErrorCode::HardwareMismatch => {
                StatusCode::FORBIDDEN
            }

            ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,

            ErrorCode::StorageError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::KeyNotFound => "Key does not exist",
            ErrorCode::KeyLocked => "Key is locked",
            ErrorCode::KeyExpired => "Key has expired",
            ErrorCode::HardwareMismatch => "HWID does not match the bound device",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::StorageError => "Key storage is unavailable",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::NetworkError => "Failed to communicate with external service",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

impl From<RejectReason> for ErrorCode {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NotFound => ErrorCode::KeyNotFound,
            RejectReason::Locked => ErrorCode::KeyLocked,
            RejectReason::Expired => ErrorCode::KeyExpired,
            RejectReason::DeviceMismatch => ErrorCode::HardwareMismatch,
        }
    }
}

/// Error response body for admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`
    pub success: bool,
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field name, constraint violated, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Adds details to an existing error.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // === Convenience constructors for common errors ===

    pub fn key_not_found(key: &str) -> Self {
        Self::with_message(ErrorCode::KeyNotFound, format!("Key '{}' not found", key))
    }

    pub fn missing_field(field: &str) -> Self {
        Self::with_message(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
        .details(serde_json::json!({ "field": field }))
    }

    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_message(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
        )
        .details(serde_json::json!({ "field": field }))
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.default_message(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::InvalidInput(msg) => ApiError::with_message(ErrorCode::InvalidRequest, msg),
            KeyError::NotFound(key) => ApiError::key_not_found(&key),
            KeyError::Storage(msg) => {
                // Paths and OS errors stay in the log.
                error!(error = %msg, "key storage failure");
                ApiError::new(ErrorCode::StorageError)
            }
            KeyError::Config(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
            KeyError::Network(msg) => ApiError::with_message(ErrorCode::NetworkError, msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(ErrorCode::KeyNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InvalidRequest.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::KeyLocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::StorageError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_is_a_500() {
        let err = ApiError::internal_error();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "An unexpected error occurred");
    }

    #[test]
    fn api_error_serialization() {
        let err = ApiError::key_not_found("7DAY-CHECKKEY-ABCDEFGHIJKL");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "KEY_NOT_FOUND");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn api_error_with_details() {
        let err = ApiError::missing_field("key");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "MISSING_FIELD");
        assert_eq!(json["details"]["field"], "key");
    }

    #[test]
    fn key_error_conversion() {
        let api_err: ApiError = KeyError::InvalidInput("bad count".to_string()).into();
        assert_eq!(api_err.code, ErrorCode::InvalidRequest);

        let api_err: ApiError = KeyError::Storage("/var/keys.json: denied".to_string()).into();
        assert_eq!(api_err.code, ErrorCode::StorageError);
        assert!(!api_err.message.contains("/var"));
    }

    #[test]
    fn reject_reason_conversion() {
        assert_eq!(
            ErrorCode::from(RejectReason::DeviceMismatch),
            ErrorCode::HardwareMismatch
        );
        assert_eq!(ErrorCode::from(RejectReason::Expired), ErrorCode::KeyExpired);
    }
}
