//! Error types shared by the key store, configuration, server and client.

use thiserror::Error;

/// Errors raised by key store operations and the surrounding plumbing.
///
/// Policy rejections on `check` (locked, expired, device mismatch) are not
/// errors; they are reported through [`crate::store::CheckOutcome`].
#[derive(Debug, Error)]
pub enum KeyError {
    /// A request field is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The key identifier is not present in the store.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Reading or writing the backing document failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP client could not reach the server or decode its reply.
    #[error("network error: {0}")]
    Network(String),
}

/// Convenience alias used across the crate.
pub type KeyResult<T> = Result<T, KeyError>;

impl From<reqwest::Error> for KeyError {
    fn from(err: reqwest::Error) -> Self {
        KeyError::Network(err.to_string())
    }
}

impl From<std::io::Error> for KeyError {
    fn from(err: std::io::Error) -> Self {
        KeyError::Storage(err.to_string())
    }
}
