use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::handlers::{
    check_key_handler, create_key_handler, delete_key_handler, health_handler, history_handler,
    list_keys_handler, lock_key_handler, renew_key_handler, reset_hwid_handler,
    unlock_key_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

#[cfg(feature = "rate-limiting")]
use crate::config::RateLimitConfig;
#[cfg(feature = "rate-limiting")]
use crate::server::rate_limit::{create_rate_limiter, rate_limit_json_body, RateLimitType};

/// Client-facing routes.
fn public_routes() -> Router<AppState> {
    Router::new().route("/api/check", post(check_key_handler))
}

/// Key administration routes.
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/create-key", post(create_key_handler))
        // Legacy admin page path
        .route("/create-key", post(create_key_handler))
        .route("/api/lock", post(lock_key_handler))
        .route("/api/unlock", post(unlock_key_handler))
        .route("/api/reset-hwid", post(reset_hwid_handler))
        .route("/api/renew", post(renew_key_handler))
        .route("/api/delete", post(delete_key_handler))
        .route("/api/keys", get(list_keys_handler))
        .route("/api/history", get(history_handler))
}

fn finish(router: Router<AppState>, state: AppState) -> Router {
    router
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}

/// Build the application router.
///
/// # Routes
///
/// - `POST /api/check` - Validate a key for a device (binds on first use)
/// - `POST /api/create-key` (also `/create-key`) - Mint keys
/// - `POST /api/lock` - Lock a key
/// - `POST /api/unlock` - Unlock a key
/// - `POST /api/reset-hwid` - Unbind the device of a key
/// - `POST /api/renew` - Change the lease of a key
/// - `POST /api/delete` - Delete a key
/// - `GET /api/keys` - List all keys
/// - `GET /api/history?key=...` - Audit trail of a key
/// - `GET /health` - Health check
pub fn build_router(state: AppState) -> Router {
    finish(public_routes().merge(admin_routes()), state)
}

/// Like [`build_router`], with per-IP rate limits on the check and admin routes.
///
/// Falls back to the unlimited router when limiting is disabled or the
/// limiter configuration is unusable.
#[cfg(feature = "rate-limiting")]
pub fn build_rate_limited_router(state: AppState, config: &RateLimitConfig) -> Router {
    if !config.enabled {
        return build_router(state);
    }

    let (Some(check_limit), Some(admin_limit)) = (
        create_rate_limiter(config, RateLimitType::Check),
        create_rate_limiter(config, RateLimitType::Admin),
    ) else {
        tracing::warn!("invalid rate limit configuration, serving without limits");
        return build_router(state);
    };

    let public = public_routes()
        .layer(check_limit)
        .layer(middleware::map_response(rate_limit_json_body));
    let admin = admin_routes()
        .layer(admin_limit)
        .layer(middleware::map_response(rate_limit_json_body));

    finish(public.merge(admin), state)
}
