//! Response bodies returned by the checkkey server, as seen by clients.

use serde::{Deserialize, Serialize};

use crate::record::{HistoryEvent, KeyDocument};

/// Reply to `POST /api/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReply {
    /// `"success"` or `"error"`
    pub status: String,
    #[serde(default)]
    pub code: Option<String>,
    pub msg: String,
    #[serde(rename = "expireAt", default)]
    pub expire_at: Option<String>,
}

impl CheckReply {
    pub fn is_valid(&self) -> bool {
        self.status == "success"
    }
}

/// Reply to `POST /api/create-key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReply {
    pub success: bool,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub message: String,
}

/// Reply to lock/unlock/reset-hwid/renew/delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "expireAt", default)]
    pub expire_at: Option<String>,
}

/// Reply to `GET /api/keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListReply {
    pub success: bool,
    pub data: KeyDocument,
}

/// Reply to `GET /api/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryReply {
    pub success: bool,
    pub data: Vec<HistoryEvent>,
    #[serde(rename = "expireAt", default)]
    pub expire_at: Option<String>,
    #[serde(default)]
    pub remaining: String,
}

/// Error body of admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reply_parses_rejection() {
        let reply: CheckReply = serde_json::from_str(
            r#"{"status":"error","code":"HARDWARE_MISMATCH","msg":"HWID does not match the bound device"}"#,
        )
        .unwrap();

        assert!(!reply.is_valid());
        assert_eq!(reply.code.as_deref(), Some("HARDWARE_MISMATCH"));
        assert!(reply.expire_at.is_none());
    }

    #[test]
    fn check_reply_parses_success_with_expiry() {
        let reply: CheckReply = serde_json::from_str(
            r#"{"status":"success","msg":"Key is valid","expireAt":"2025-01-08T00:00:00Z"}"#,
        )
        .unwrap();

        assert!(reply.is_valid());
        assert_eq!(reply.expire_at.as_deref(), Some("2025-01-08T00:00:00Z"));
    }

    #[test]
    fn error_reply_tolerates_missing_fields() {
        let reply: ErrorReply = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(reply.code.is_none());
        assert!(reply.message.is_empty());
    }
}
