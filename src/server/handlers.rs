//! Axum HTTP handlers for the key endpoints.
//!
//! Store operations do blocking file I/O under the store lock, so every
//! handler runs them on the blocking thread pool.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::duration::LeaseDuration;
use crate::errors::{KeyError, KeyResult};
use crate::record::{HistoryEvent, KeyDocument};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::extractors::{CheckJson, Json, Query};
use crate::server::logging::{log_key_event, HealthResponse, KeyEvent};
use crate::server::validation::{validate_hwid, validate_key_id, validate_note};
use crate::store::{CheckOutcome, KeyStore, RejectReason};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KeyStore>,
    /// Offset used when rendering timestamps for humans
    pub display_offset: FixedOffset,
}

impl AppState {
    pub fn new(store: Arc<KeyStore>, display_offset: FixedOffset) -> Self {
        Self {
            store,
            display_offset,
        }
    }
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&KeyStore) -> KeyResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| {
            error!("key store task failed: {e}");
            ApiError::internal_error()
        })?;
    Ok(result?)
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A field that clients send either as a JSON number or as a string.
///
/// HTML forms post `"7"` where API clients post `7`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(u64),
    Text(String),
}

impl NumberOrText {
    fn to_duration(&self) -> KeyResult<LeaseDuration> {
        match self {
            NumberOrText::Number(days) => LeaseDuration::from_days(*days),
            NumberOrText::Text(text) => text.parse(),
        }
    }

    fn to_count(&self) -> KeyResult<u32> {
        let invalid = || KeyError::InvalidInput("count must be a positive integer".to_string());
        match self {
            NumberOrText::Number(n) => u32::try_from(*n).map_err(|_| invalid()),
            NumberOrText::Text(text) => text.trim().parse().map_err(|_| invalid()),
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field(field))
}

fn required_key(value: &Option<String>) -> Result<String, ApiError> {
    let key = required(value, "key")?;
    validate_key_id(key, "key")?;
    Ok(key.to_string())
}

fn parse_duration(value: &Option<NumberOrText>) -> Result<LeaseDuration, ApiError> {
    let raw = value
        .as_ref()
        .ok_or_else(|| ApiError::missing_field("duration"))?;
    raw.to_duration()
        .map_err(|e| ApiError::invalid_field("duration", &e.to_string()))
}

// ============================================================================
// Create
// ============================================================================

/// Request body for minting keys.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default, alias = "days")]
    pub duration: Option<NumberOrText>,
    #[serde(default, alias = "amount")]
    pub count: Option<NumberOrText>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub success: bool,
    pub keys: Vec<String>,
    pub message: String,
}

/// `POST /api/create-key`: mint a batch of keys.
pub async fn create_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateKeyRequest>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    let duration = parse_duration(&payload.duration)?;
    let count = payload
        .count
        .as_ref()
        .ok_or_else(|| ApiError::missing_field("count"))?
        .to_count()
        .map_err(|e| ApiError::invalid_field("count", &e.to_string()))?;
    validate_note(payload.note.as_deref(), "note")?;
    let note = payload.note.unwrap_or_default().trim().to_string();

    let keys = with_store(&state, move |store| store.create(duration, count, &note)).await?;

    for key in &keys {
        log_key_event(KeyEvent::Created, key, Some(&duration.tag()));
    }

    Ok(Json(CreateKeyResponse {
        success: true,
        message: format!("Created {} key(s) for {}", keys.len(), duration),
        keys,
    }))
}

// ============================================================================
// Check
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub hwid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub msg: String,
    #[serde(rename = "expireAt", skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
}

impl CheckResponse {
    fn success(msg: &str, expire_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: CheckStatus::Success,
            code: None,
            msg: msg.to_string(),
            expire_at: expire_at.map(rfc3339),
        }
    }

    pub(crate) fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            code: Some(code),
            msg: msg.into(),
            expire_at: None,
        }
    }
}

impl From<CheckOutcome> for CheckResponse {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Activated { expire_at } => {
                CheckResponse::success("Key is valid (HWID bound on first use)", expire_at)
            }
            CheckOutcome::Validated { expire_at } => {
                CheckResponse::success("Key is valid", expire_at)
            }
            CheckOutcome::Rejected(reason) => {
                let code = ErrorCode::from(reason);
                CheckResponse::error(code, code.default_message())
            }
        }
    }
}

fn reject_reason_name(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::NotFound => "not_found",
        RejectReason::Locked => "locked",
        RejectReason::Expired => "expired",
        RejectReason::DeviceMismatch => "device_mismatch",
    }
}

/// `POST /api/check`: validate a key for a device, binding it on first use.
///
/// Rejections are ordinary answers (HTTP 200, `status: "error"`); only
/// malformed requests and storage failures use error status codes.
pub async fn check_key_handler(
    State(state): State<AppState>,
    CheckJson(payload): CheckJson<CheckRequest>,
) -> (StatusCode, Json<CheckResponse>) {
    let (key, hwid) = match (payload.key, payload.hwid) {
        (Some(key), Some(hwid)) if !key.trim().is_empty() && !hwid.trim().is_empty() => {
            (key, hwid)
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(CheckResponse::error(
                    ErrorCode::MissingField,
                    "Missing key or HWID",
                )),
            );
        }
    };

    if let Err(e) = validate_key_id(&key, "key").and_then(|_| validate_hwid(&hwid, "hwid")) {
        return (
            StatusCode::BAD_REQUEST,
            Json(CheckResponse::error(ErrorCode::InvalidField, e.to_string())),
        );
    }

    let lookup_key = key.clone();
    let outcome = match with_store(&state, move |store| store.check(&lookup_key, &hwid)).await {
        Ok(outcome) => outcome,
        Err(api_error) => {
            return (
                api_error.status_code(),
                Json(CheckResponse::error(api_error.code, api_error.message)),
            );
        }
    };

    match &outcome {
        CheckOutcome::Activated { .. } => log_key_event(KeyEvent::Activated, &key, None),
        CheckOutcome::Validated { .. } => log_key_event(KeyEvent::Validated, &key, None),
        CheckOutcome::Rejected(reason) => log_key_event(
            KeyEvent::CheckRejected,
            &key,
            Some(reject_reason_name(*reason)),
        ),
    }

    (StatusCode::OK, Json(CheckResponse::from(outcome)))
}

// ============================================================================
// Admin operations
// ============================================================================

/// Body carrying only a key.
#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "days")]
    pub duration: Option<NumberOrText>,
}

/// Generic admin acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "expireAt", skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            expire_at: None,
        })
    }
}

/// `POST /api/lock`
pub async fn lock_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<LockRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(&payload.key)?;
    validate_note(payload.reason.as_deref(), "reason")?;
    let reason = payload.reason;

    let target = key.clone();
    let logged_reason = reason.clone();
    with_store(&state, move |store| store.lock(&target, reason.as_deref())).await?;

    log_key_event(KeyEvent::Locked, &key, logged_reason.as_deref());
    Ok(MessageResponse::ok(format!("Key {key} locked")))
}

/// `POST /api/unlock`
pub async fn unlock_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<KeyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(&payload.key)?;

    let target = key.clone();
    with_store(&state, move |store| store.unlock(&target)).await?;

    log_key_event(KeyEvent::Unlocked, &key, None);
    Ok(MessageResponse::ok(format!("Key {key} unlocked")))
}

/// `POST /api/reset-hwid`
pub async fn reset_hwid_handler(
    State(state): State<AppState>,
    Json(payload): Json<KeyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(&payload.key)?;

    let target = key.clone();
    with_store(&state, move |store| store.reset_hwid(&target)).await?;

    log_key_event(KeyEvent::HwidReset, &key, None);
    Ok(MessageResponse::ok(format!("HWID of key {key} reset")))
}

/// `POST /api/renew`
pub async fn renew_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<RenewRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(&payload.key)?;
    let duration = parse_duration(&payload.duration)?;

    let target = key.clone();
    let expire_at = with_store(&state, move |store| store.renew(&target, duration)).await?;

    log_key_event(KeyEvent::Renewed, &key, Some(&duration.tag()));
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Key {key} renewed to {duration}"),
        expire_at: expire_at.map(rfc3339),
    }))
}

/// `POST /api/delete`
pub async fn delete_key_handler(
    State(state): State<AppState>,
    Json(payload): Json<KeyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(&payload.key)?;

    let target = key.clone();
    with_store(&state, move |store| store.delete(&target)).await?;

    log_key_event(KeyEvent::Deleted, &key, None);
    Ok(MessageResponse::ok(format!("Key {key} deleted")))
}

// ============================================================================
// Read-only projections
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    pub success: bool,
    pub data: KeyDocument,
}

/// `GET /api/keys`
pub async fn list_keys_handler(
    State(state): State<AppState>,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let data = with_store(&state, |store| Ok(store.list())).await?;
    Ok(Json(ListKeysResponse {
        success: true,
        data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: Vec<HistoryEvent>,
    /// Expiry in the display offset, if the lease is running
    #[serde(rename = "expireAt", skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
    pub remaining: String,
}

/// `GET /api/history?key=...`
pub async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let key = required_key(&query.key)?;
    let offset = state.display_offset;

    let view = with_store(&state, move |store| store.history_view(&key, offset)).await?;

    Ok(Json(HistoryResponse {
        success: true,
        data: view.events,
        expire_at: view.expire_at,
        remaining: view.remaining,
    }))
}

/// `GET /health`
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let (location, keys) =
        with_store(&state, |store| Ok((store.location(), store.list().len()))).await?;
    Ok(Json(HealthResponse::healthy(location, keys)))
}
