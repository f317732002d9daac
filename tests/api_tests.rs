//! Integration tests for the HTTP API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use checkkey::clock::FixedClock;
use checkkey::presentation::display_offset;
use checkkey::server::handlers::AppState;
use checkkey::server::routes::build_router;
use checkkey::store::{KeyStore, MemoryPersistence, StoreSettings};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to create an app over an in-memory store with a fixed clock.
fn setup_test_app() -> AppState {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    ));
    let store = KeyStore::new(Arc::new(MemoryPersistence::new()), StoreSettings::default())
        .with_clock(clock);
    AppState::new(Arc::new(store), display_offset(7))
}

/// Helper to make a JSON request to the app.
async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let body_bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body_bytes))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, headers, body)
}

async fn json_request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, body) = request(app, method, uri, body).await;
    (status, body)
}

async fn create_one(app: &axum::Router, duration: &str) -> String {
    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/create-key",
        Some(json!({ "duration": duration, "count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["keys"][0].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_key_returns_keys() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(
        app,
        "POST",
        "/api/create-key",
        Some(json!({ "duration": "30DAY", "count": 3, "note": "reseller" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys
        .iter()
        .all(|k| k.as_str().unwrap().starts_with("30DAY-CHECKKEY-")));
}

#[tokio::test]
async fn create_key_accepts_form_style_fields() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/create-key",
        Some(json!({ "days": "7", "amount": "2" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"].as_array().unwrap().len(), 2);
    assert!(body["keys"][0].as_str().unwrap().starts_with("7DAY-"));
}

#[tokio::test]
async fn create_key_rejects_bad_input() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/create-key",
        Some(json!({ "count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "MISSING_FIELD");

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/create-key",
        Some(json!({ "duration": "14DAY", "count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FIELD");

    let (status, body) = json_request(
        app,
        "POST",
        "/api/create-key",
        Some(json!({ "duration": "7DAY", "count": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn check_flow_binds_then_rejects_other_devices() {
    let app = build_router(setup_test_app());
    let key = create_one(&app, "7DAY").await;

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["expireAt"], "2025-01-08T00:00:00Z");

    let (_, body) = json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW1" })),
    )
    .await;
    assert_eq!(body["status"], "success");

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "HARDWARE_MISMATCH");

    let (status, _) = json_request(
        app.clone(),
        "POST",
        "/api/lock",
        Some(json!({ "key": key, "reason": "abuse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = json_request(
        app,
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW1" })),
    )
    .await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "KEY_LOCKED");
}

#[tokio::test]
async fn check_unknown_key_is_an_ordinary_answer() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(
        app,
        "POST",
        "/api/check",
        Some(json!({ "key": "7DAY-CHECKKEY-UNKNOWNKEY01", "hwid": "HW1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "KEY_NOT_FOUND");
    assert!(body.get("expireAt").is_none());
}

#[tokio::test]
async fn check_requires_key_and_hwid() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": "7DAY-CHECKKEY-ABCDEFGHIJKL" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "MISSING_FIELD");

    let (status, body) = json_request(
        app,
        "POST",
        "/api/check",
        Some(json!({ "key": "bad key!", "hwid": "HW1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FIELD");
}

#[tokio::test]
async fn admin_operations_on_unknown_key_return_404() {
    let app = build_router(setup_test_app());
    let key = "7DAY-CHECKKEY-UNKNOWNKEY01";

    for (uri, body) in [
        ("/api/lock", json!({ "key": key })),
        ("/api/unlock", json!({ "key": key })),
        ("/api/reset-hwid", json!({ "key": key })),
        ("/api/renew", json!({ "key": key, "duration": 30 })),
        ("/api/delete", json!({ "key": key })),
    ] {
        let (status, body) = json_request(app.clone(), "POST", uri, Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "KEY_NOT_FOUND");
    }

    let (status, _) = json_request(
        app,
        "GET",
        &format!("/api/history?key={key}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_operations_require_key() {
    let app = build_router(setup_test_app());

    let (status, body) = json_request(app, "POST", "/api/lock", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");
    assert_eq!(body["details"]["field"], "key");
}

#[tokio::test]
async fn reset_hwid_and_renew_over_http() {
    let app = build_router(setup_test_app());
    let key = create_one(&app, "1DAY").await;

    json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW1" })),
    )
    .await;

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/reset-hwid",
        Some(json!({ "key": key })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW2" })),
    )
    .await;
    assert_eq!(body["status"], "success");

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/renew",
        Some(json!({ "key": key, "days": "90DAY" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expireAt"], "2025-04-01T00:00:00Z");

    let (status, body) = json_request(app, "GET", "/api/keys", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][&key]["duration"], 90);
    assert_eq!(body["data"][&key]["hwid"], "HW2");
}

#[tokio::test]
async fn history_lists_events_with_local_expiry() {
    let app = build_router(setup_test_app());
    let key = create_one(&app, "7DAY").await;

    json_request(
        app.clone(),
        "POST",
        "/api/check",
        Some(json!({ "key": key, "hwid": "HW1" })),
    )
    .await;

    let (status, body) = json_request(
        app,
        "GET",
        &format!("/api/history?key={key}"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["action"], "create");
    assert_eq!(events[1]["action"], "activate");
    assert_eq!(events[1]["note"], "HW1");
    assert_eq!(body["expireAt"], "2025-01-08 07:00:00");
    assert_eq!(body["remaining"], "7d 0h 0m");
}

#[tokio::test]
async fn delete_then_list_is_empty() {
    let app = build_router(setup_test_app());
    let key = create_one(&app, "1DAY").await;

    let (status, _) = json_request(
        app.clone(),
        "POST",
        "/api/delete",
        Some(json!({ "key": key })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = json_request(app, "GET", "/api/keys", None).await;
    assert_eq!(body["data"], json!({}));
}

#[tokio::test]
async fn health_reports_storage_and_request_id() {
    let app = build_router(setup_test_app());
    create_one(&app, "1DAY").await;

    let (status, headers, body) = request(app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "checkkey");
    assert_eq!(body["storage"]["location"], "memory");
    assert_eq!(body["storage"]["keys"], 1);
    assert!(headers.contains_key("x-request-id"));
}

/// Helper to POST a body that is not built from a `Value`.
async fn raw_request(
    app: axum::Router,
    uri: &str,
    body: &'static str,
) -> (StatusCode, HeaderMap, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).expect("error body should be JSON");

    (status, headers, body)
}

#[tokio::test]
async fn check_with_non_string_key_answers_in_check_shape() {
    let app = build_router(setup_test_app());

    let (status, headers, body) =
        raw_request(app, "/api/check", r#"{"key":123,"hwid":"HW1"}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["msg"].as_str().is_some());
}

#[tokio::test]
async fn admin_endpoints_reject_unparsable_bodies_as_json() {
    let app = build_router(setup_test_app());

    let (status, headers, body) = raw_request(app.clone(), "/api/create-key", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, _, body) = raw_request(
        app.clone(),
        "/api/create-key",
        r#"{"duration":"7DAY","count":1.5}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, _, body) = raw_request(app, "/api/lock", r#"{"key":["a"]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn check_with_non_json_body_answers_in_check_shape() {
    let app = build_router(setup_test_app());

    let (status, _, body) = raw_request(app, "/api/check", "not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "INVALID_REQUEST");
}
