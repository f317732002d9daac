//! Configuration system for checkkey.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `CHECKKEY_SERVER_HOST` - Server bind address
//! - `CHECKKEY_SERVER_PORT` - Server port (falls back to `PORT`, as set by most hosting platforms)
//! - `CHECKKEY_STORAGE_PATH` - Path of the JSON key document
//! - `CHECKKEY_KEY_NAMESPACE` - Fixed middle segment of generated keys
//! - `CHECKKEY_KEY_RANDOM_LENGTH` - Length of the random key segment (10-15)
//! - `CHECKKEY_MAX_BATCH` - Largest `count` accepted by a single create call
//! - `CHECKKEY_EXPIRY_ANCHOR` - `activation` or `creation`
//! - `CHECKKEY_DISPLAY_OFFSET_HOURS` - UTC offset used when formatting timestamps
//! - `CHECKKEY_LOGGING_ENABLED` - Enable request logging
//! - `CHECKKEY_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `CHECKKEY_RATE_LIMIT_ENABLED` - Enable rate limiting (requires `rate-limiting` feature)
//! - `CHECKKEY_RATE_LIMIT_CHECK_RPM` - Requests per minute allowed on `/api/check`
//! - `CHECKKEY_RATE_LIMIT_ADMIN_RPM` - Requests per minute allowed on admin endpoints
//! - `CHECKKEY_RATE_LIMIT_BURST_SIZE` - Requests allowed in a burst above the rate

use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{KeyError, KeyResult};

/// Global configuration singleton.
static CONFIG: OnceLock<CheckKeyConfig> = OnceLock::new();

/// Shortest random key segment we accept.
pub const MIN_RANDOM_LENGTH: u8 = 10;
/// Longest random key segment we accept.
pub const MAX_RANDOM_LENGTH: u8 = 15;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckKeyConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub keys: KeyConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Where the key document lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("keys.json"),
        }
    }
}

/// When the lease clock of a key starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryAnchor {
    /// Lease starts at the first successful HWID bind.
    #[default]
    Activation,
    /// Lease starts when the key is minted.
    Creation,
}

/// Key generation and lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Fixed middle segment, e.g. "7DAY-CHECKKEY-XXXXXXXXXXXX"
    pub namespace: String,
    /// Characters in the random trailing segment
    pub random_length: u8,
    /// Maximum number of keys minted by one create call
    pub max_batch: u32,
    pub expiry_anchor: ExpiryAnchor,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            namespace: "CHECKKEY".to_string(),
            random_length: 12,
            max_batch: 1000,
            expiry_anchor: ExpiryAnchor::Activation,
        }
    }
}

/// Presentation settings. Stored timestamps are always UTC.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub utc_offset_hours: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 7,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Rate limiting configuration (used with the `rate-limiting` feature).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// `/api/check` requests per minute per client IP
    pub check_rpm: u32,
    /// Admin endpoint requests per minute per client IP
    pub admin_rpm: u32,
    /// Short bursts allowed above the steady rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_rpm: 120,
            admin_rpm: 30,
            burst_size: 5,
        }
    }
}

fn config_error(err: ConfigError) -> KeyError {
    KeyError::Config(err.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl CheckKeyConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// This bypasses the global cache; most callers want [`get_config`].
    pub fn load() -> KeyResult<Self> {
        let defaults = CheckKeyConfig::default();

        let port = env_parsed::<i64>("CHECKKEY_SERVER_PORT").or_else(|| env_parsed::<i64>("PORT"));

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host.clone())
            .map_err(config_error)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_error)?
            .set_default("storage.path", defaults.storage.path.to_string_lossy().to_string())
            .map_err(config_error)?
            .set_default("keys.namespace", defaults.keys.namespace.clone())
            .map_err(config_error)?
            .set_default("keys.random_length", i64::from(defaults.keys.random_length))
            .map_err(config_error)?
            .set_default("keys.max_batch", i64::from(defaults.keys.max_batch))
            .map_err(config_error)?
            .set_default("keys.expiry_anchor", "activation")
            .map_err(config_error)?
            .set_default("display.utc_offset_hours", i64::from(defaults.display.utc_offset_hours))
            .map_err(config_error)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(config_error)?
            .set_default("logging.level", defaults.logging.level.clone())
            .map_err(config_error)?
            .set_default("rate_limit.enabled", defaults.rate_limit.enabled)
            .map_err(config_error)?
            .set_default("rate_limit.check_rpm", i64::from(defaults.rate_limit.check_rpm))
            .map_err(config_error)?
            .set_default("rate_limit.admin_rpm", i64::from(defaults.rate_limit.admin_rpm))
            .map_err(config_error)?
            .set_default("rate_limit.burst_size", i64::from(defaults.rate_limit.burst_size))
            .map_err(config_error)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("CHECKKEY_SERVER_HOST").ok())
            .map_err(config_error)?
            .set_override_option("server.port", port)
            .map_err(config_error)?
            .set_override_option("storage.path", env::var("CHECKKEY_STORAGE_PATH").ok())
            .map_err(config_error)?
            .set_override_option("keys.namespace", env::var("CHECKKEY_KEY_NAMESPACE").ok())
            .map_err(config_error)?
            .set_override_option(
                "keys.random_length",
                env_parsed::<i64>("CHECKKEY_KEY_RANDOM_LENGTH"),
            )
            .map_err(config_error)?
            .set_override_option("keys.max_batch", env_parsed::<i64>("CHECKKEY_MAX_BATCH"))
            .map_err(config_error)?
            .set_override_option(
                "keys.expiry_anchor",
                env::var("CHECKKEY_EXPIRY_ANCHOR")
                    .ok()
                    .map(|v| v.to_lowercase()),
            )
            .map_err(config_error)?
            .set_override_option(
                "display.utc_offset_hours",
                env_parsed::<i64>("CHECKKEY_DISPLAY_OFFSET_HOURS"),
            )
            .map_err(config_error)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("CHECKKEY_LOGGING_ENABLED"),
            )
            .map_err(config_error)?
            .set_override_option("logging.level", env::var("CHECKKEY_LOG_LEVEL").ok())
            .map_err(config_error)?
            .set_override_option(
                "rate_limit.enabled",
                env_parsed::<bool>("CHECKKEY_RATE_LIMIT_ENABLED"),
            )
            .map_err(config_error)?
            .set_override_option(
                "rate_limit.check_rpm",
                env_parsed::<i64>("CHECKKEY_RATE_LIMIT_CHECK_RPM"),
            )
            .map_err(config_error)?
            .set_override_option(
                "rate_limit.admin_rpm",
                env_parsed::<i64>("CHECKKEY_RATE_LIMIT_ADMIN_RPM"),
            )
            .map_err(config_error)?
            .set_override_option(
                "rate_limit.burst_size",
                env_parsed::<i64>("CHECKKEY_RATE_LIMIT_BURST_SIZE"),
            )
            .map_err(config_error)?;

        let settings = builder
            .build()
            .map_err(|e| KeyError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| KeyError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> KeyResult<()> {
        if self.server.port == 0 {
            return Err(KeyError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(KeyError::Config("storage.path cannot be empty".to_string()));
        }

        let namespace = &self.keys.namespace;
        if namespace.is_empty()
            || !namespace
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(KeyError::Config(format!(
                "keys.namespace must be non-empty uppercase alphanumeric, got '{namespace}'"
            )));
        }

        if !(MIN_RANDOM_LENGTH..=MAX_RANDOM_LENGTH).contains(&self.keys.random_length) {
            return Err(KeyError::Config(format!(
                "keys.random_length must be between {MIN_RANDOM_LENGTH} and {MAX_RANDOM_LENGTH}, got {}",
                self.keys.random_length
            )));
        }

        if self.keys.max_batch == 0 {
            return Err(KeyError::Config(
                "keys.max_batch must be greater than 0".to_string(),
            ));
        }

        if !(-12..=14).contains(&self.display.utc_offset_hours) {
            return Err(KeyError::Config(format!(
                "display.utc_offset_hours must be between -12 and 14, got {}",
                self.display.utc_offset_hours
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(KeyError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> KeyResult<&'static CheckKeyConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = CheckKeyConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CheckKeyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.keys.expiry_anchor, ExpiryAnchor::Activation);
        assert_eq!(config.display.utc_offset_hours, 7);
    }

    #[test]
    fn rejects_random_length_out_of_range() {
        let mut config = CheckKeyConfig::default();
        config.keys.random_length = 9;
        assert!(config.validate().is_err());
        config.keys.random_length = 16;
        assert!(config.validate().is_err());
        config.keys.random_length = 15;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_lowercase_namespace() {
        let mut config = CheckKeyConfig::default();
        config.keys.namespace = "checkkey".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = CheckKeyConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
