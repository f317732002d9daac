use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use checkkey::config::{get_config, CheckKeyConfig, LoggingConfig};
use checkkey::errors::{KeyError, KeyResult};
use checkkey::presentation::display_offset;
use checkkey::server::AppState;
use checkkey::store::KeyStore;
use tracing::{info, Level};

fn init_tracing(logging: &LoggingConfig) {
    if !logging.enabled {
        return;
    }
    let level = Level::from_str(&logging.level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn app(config: &CheckKeyConfig, state: AppState) -> axum::Router {
    #[cfg(feature = "rate-limiting")]
    let router = checkkey::server::build_rate_limited_router(state, &config.rate_limit);

    #[cfg(not(feature = "rate-limiting"))]
    let router = {
        if config.rate_limit.enabled {
            tracing::debug!("rate limiting configured but the `rate-limiting` feature is off");
        }
        checkkey::server::build_router(state)
    };

    router
}

async fn run() -> KeyResult<()> {
    let config = get_config()?;
    init_tracing(&config.logging);

    let store = Arc::new(KeyStore::from_config(config));
    let state = AppState::new(store, display_offset(config.display.utc_offset_hours));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KeyError::Config(format!("failed to bind {addr}: {e}")))?;

    info!(
        address = %addr,
        storage = %config.storage.path.display(),
        anchor = ?config.keys.expiry_anchor,
        "checkkey server listening"
    );

    axum::serve(
        listener,
        app(config, state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| KeyError::Config(format!("server error: {e}")))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("checkkey_server: {e}");
        std::process::exit(1);
    }
}
