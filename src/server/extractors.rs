//! Extractors that answer malformed requests with JSON instead of plain text.
//!
//! Axum's own `Json` and `Query` reject with `text/plain` bodies and a mix of
//! 400 and 422 statuses. These wrappers keep every failure in the API's JSON
//! shapes with a 400 and `INVALID_REQUEST`.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::CheckResponse;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "rejected request body");
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(status = %rejection.status(), "rejected query string");
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    }
}

/// JSON body extractor for admin endpoints, rejecting with [`ApiError`].
///
/// Also usable as a response, like `axum::Json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// JSON body extractor for `/api/check`.
///
/// Clients of the check endpoint only understand `{status, code, msg}`, so
/// a bad body is reported in that shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckJson<T>(pub T);

/// Rejection for [`CheckJson`]: a 400 carrying an error [`CheckResponse`].
#[derive(Debug)]
pub struct CheckRejection(pub CheckResponse);

impl IntoResponse for CheckRejection {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, axum::Json(self.0)).into_response()
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for CheckJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = CheckRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(CheckJson(value)),
            Err(rejection) => {
                let error = ApiError::from(rejection);
                Err(CheckRejection(CheckResponse::error(error.code, error.message)))
            }
        }
    }
}

/// Query string extractor, rejecting with [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Query<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Query(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct KeyOnly {
        #[allow(dead_code)]
        key: String,
    }

    fn json_request(body: &'static str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn syntax_error_is_invalid_request() {
        let err = Json::<KeyOnly>::from_request(json_request("not json"), &())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn type_mismatch_uses_check_shape() {
        let rejection = CheckJson::<KeyOnly>::from_request(json_request(r#"{"key":123}"#), &())
            .await
            .unwrap_err();
        assert_eq!(rejection.0.code, Some(ErrorCode::InvalidRequest));
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
