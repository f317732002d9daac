//! Request logging middleware and key audit logging.
//!
//! Every request gets a UUID request ID, a tracing span carrying method and
//! path, a completion line with status and duration, and an `X-Request-Id`
//! response header. Key lifecycle changes are logged as structured
//! `key_event` spans next to the persisted history.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Key lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Created,
    Activated,
    Validated,
    CheckRejected,
    Locked,
    Unlocked,
    HwidReset,
    Renewed,
    Deleted,
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KeyEvent::Created => "created",
            KeyEvent::Activated => "activated",
            KeyEvent::Validated => "validated",
            KeyEvent::CheckRejected => "check_rejected",
            KeyEvent::Locked => "locked",
            KeyEvent::Unlocked => "unlocked",
            KeyEvent::HwidReset => "hwid_reset",
            KeyEvent::Renewed => "renewed",
            KeyEvent::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Log a key state change.
///
/// Rejected checks are logged at `warn`, everything else at `info`.
pub fn log_key_event(event: KeyEvent, key: &str, details: Option<&str>) {
    let span = info_span!("key_event", event = %event, key = %key);
    let _enter = span.enter();

    match (event, details) {
        (KeyEvent::CheckRejected, Some(d)) => warn!(reason = %d, "Key event occurred"),
        (KeyEvent::CheckRejected, None) => warn!("Key event occurred"),
        (_, Some(d)) => info!(details = %d, "Key event occurred"),
        (_, None) => info!("Key event occurred"),
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status ("healthy")
    pub status: String,
    pub service: String,
    pub version: String,
    pub storage: StorageHealth,
}

/// Key document status.
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    /// Where the document lives (file path or "memory")
    pub location: String,
    /// Number of keys currently stored
    pub keys: usize,
}

impl HealthResponse {
    pub fn healthy(location: String, keys: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            service: "checkkey".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage: StorageHealth { location, keys },
        }
    }
}
