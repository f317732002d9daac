//! Rate limiting middleware for checkkey endpoints.
//!
//! Limits are per client IP and configurable via `config.toml` or
//! environment variables:
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//! check_rpm = 120   # /api/check: 120 requests per minute
//! admin_rpm = 30    # admin endpoints: 30 requests per minute
//! burst_size = 5    # Allow short bursts above the limit
//! ```
//!
//! Rejected requests get a 429 JSON body with a `Retry-After` header.
//!
//! The server must be started with
//! `.into_make_service_with_connect_info::<SocketAddr>()` so the peer
//! address is available when no forwarding headers are present.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;

pub use tower_governor::key_extractor::SmartIpKeyExtractor;
pub use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;

/// Rate limiter types for different endpoint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    /// `/api/check`, called by every client on start-up
    Check,
    /// Key administration endpoints
    Admin,
}

/// Create a rate limiting layer for the specified endpoint type.
///
/// Returns `None` if the limiter configuration is rejected by governor
/// (e.g. a zero burst size).
pub fn create_rate_limiter(
    config: &RateLimitConfig,
    limit_type: RateLimitType,
) -> Option<GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware>> {
    let rpm = match limit_type {
        RateLimitType::Check => config.check_rpm,
        RateLimitType::Admin => config.admin_rpm,
    };

    // requests_per_minute -> one request every (60000/rpm) milliseconds
    let interval_ms = if rpm > 0 { 60_000 / rpm.min(60_000) } else { 60_000 };

    let governor_config = GovernorConfigBuilder::default()
        .per_millisecond(interval_ms.into())
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()?;

    Some(GovernorLayer {
        config: Arc::new(governor_config),
    })
}

/// Build the 429 response returned to throttled clients.
pub fn rate_limit_error_response(retry_after_secs: u64) -> Response {
    let retry_after = retry_after_secs.max(1);
    let body = serde_json::json!({
        "success": false,
        "code": "RATE_LIMITED",
        "message": format!("Rate limit exceeded. Please retry after {} seconds.", retry_after),
        "retry_after_seconds": retry_after
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Replace governor's plain-text 429 with the JSON body above.
pub async fn rate_limit_json_body(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    rate_limit_error_response(retry_after)
}
