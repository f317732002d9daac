// src/server/mod.rs

//! Server-side components for checkkey.
//!
//! This module contains:
//! - `handlers`    → Axum HTTP handlers for the key endpoints
//! - `routes`      → Router builder
//! - `api_error`   → JSON error responses and error codes
//! - `extractors`  → Body and query extractors with JSON rejections
//! - `logging`     → Request logging middleware and key event logging
//! - `validation`  → Request validation utilities
//! - `rate_limit`  → Rate limiting middleware (requires `rate-limiting` feature)

pub mod api_error;
pub mod extractors;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod validation;

#[cfg(feature = "rate-limiting")]
pub mod rate_limit;

pub use api_error::{ApiError, ErrorCode};
pub use handlers::{
    check_key_handler, create_key_handler, delete_key_handler, health_handler, history_handler,
    list_keys_handler, lock_key_handler, renew_key_handler, reset_hwid_handler,
    unlock_key_handler, AppState, CheckRequest, CheckResponse, CheckStatus, CreateKeyRequest,
    CreateKeyResponse, HistoryResponse, ListKeysResponse, MessageResponse,
};
pub use routes::build_router;

#[cfg(feature = "rate-limiting")]
pub use routes::build_rate_limited_router;

pub use validation::{
    validate_hwid, validate_key_id, validate_length, validate_not_empty, validate_note,
    ValidationError, ValidationResult,
};
