//! checkkey - license key issuing and validation
//!
//! Keys look like `7DAY-CHECKKEY-K3J9Q2M4ZT8X`. Each one carries a lease
//! duration, binds to the first hardware ID (HWID) that checks it, and keeps
//! an append-only audit history. The whole store is a single JSON document.
//!
//! # Features
//!
//! - `server` - Axum HTTP server (handlers, routes, logging). Enabled by default.
//! - `rate-limiting` - Per-IP rate limits on the HTTP routes.
//!
//! # Example
//!
//! ```toml
//! # Store, models and HTTP client only
//! checkkey = { path = ".", default-features = false }
//!
//! # Server with rate limiting
//! checkkey = { path = ".", features = ["rate-limiting"] }
//! ```

// Core modules (always available)
pub mod clock;
pub mod config;
pub mod duration;
pub mod errors;
pub mod key_generation;
pub mod presentation;
pub mod record;
pub mod store;

// HTTP client for a running server (always available)
pub mod client {
    pub mod key_client;
    pub mod responses;

    pub use key_client::KeyClient;
}

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
