//! HTTP client for the checkkey API.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::client::responses::{
    CheckReply, CreateReply, ErrorReply, HistoryReply, ListReply, MessageReply,
};
use crate::errors::{KeyError, KeyResult};

/// Thin wrapper around `reqwest` for one checkkey server.
#[derive(Debug, Clone)]
pub struct KeyClient {
    http: Client,
    base_url: String,
}

impl KeyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a success body, or turn an error body into a [`KeyError`].
    async fn decode<T: DeserializeOwned>(response: Response) -> KeyResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let error = response
            .json::<ErrorReply>()
            .await
            .unwrap_or_else(|_| ErrorReply {
                code: None,
                message: status.to_string(),
            });
        debug!(status = %status, code = ?error.code, "server returned an error");

        Err(match status {
            StatusCode::NOT_FOUND => KeyError::NotFound(error.message),
            StatusCode::BAD_REQUEST => KeyError::InvalidInput(error.message),
            StatusCode::INTERNAL_SERVER_ERROR => KeyError::Storage(error.message),
            _ => KeyError::Network(format!("{status}: {}", error.message)),
        })
    }

    /// Check `key` for the device `hwid`.
    ///
    /// Rejections come back as a [`CheckReply`] with `status == "error"`,
    /// not as an `Err`.
    pub async fn check(&self, key: &str, hwid: &str) -> KeyResult<CheckReply> {
        let response = self
            .http
            .post(self.url("/api/check"))
            .json(&json!({ "key": key, "hwid": hwid }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| KeyError::Network(format!("unexpected check reply ({status}): {e}")))
    }

    pub async fn create(
        &self,
        duration: &str,
        count: u32,
        note: Option<&str>,
    ) -> KeyResult<CreateReply> {
        let response = self
            .http
            .post(self.url("/api/create-key"))
            .json(&json!({ "duration": duration, "count": count, "note": note }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn lock(&self, key: &str, reason: Option<&str>) -> KeyResult<MessageReply> {
        self.post_message("/api/lock", json!({ "key": key, "reason": reason }))
            .await
    }

    pub async fn unlock(&self, key: &str) -> KeyResult<MessageReply> {
        self.post_message("/api/unlock", json!({ "key": key })).await
    }

    pub async fn reset_hwid(&self, key: &str) -> KeyResult<MessageReply> {
        self.post_message("/api/reset-hwid", json!({ "key": key }))
            .await
    }

    pub async fn renew(&self, key: &str, duration: &str) -> KeyResult<MessageReply> {
        self.post_message("/api/renew", json!({ "key": key, "duration": duration }))
            .await
    }

    pub async fn delete(&self, key: &str) -> KeyResult<MessageReply> {
        self.post_message("/api/delete", json!({ "key": key }))
            .await
    }

    pub async fn list(&self) -> KeyResult<ListReply> {
        let response = self.http.get(self.url("/api/keys")).send().await?;
        Self::decode(response).await
    }

    pub async fn history(&self, key: &str) -> KeyResult<HistoryReply> {
        let response = self
            .http
            .get(self.url("/api/history"))
            .query(&[("key", key)])
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_message(&self, path: &str, body: serde_json::Value) -> KeyResult<MessageReply> {
        let response = self.http.post(self.url(path)).json(&body).send().await?;
        Self::decode(response).await
    }
}
