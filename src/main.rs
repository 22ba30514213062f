//! Costume Studio
//!
//! Classifies uploaded costume photos and composites merged portraits of two
//! people onto a chosen background.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use costume_studio::config::LogFormat;
use costume_studio::models::Background;
use costume_studio::{api, config, AppState, Error, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::init();

    // Initialize tracing
    let json = config.log.format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "costume_studio=debug,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        "Starting costume studio on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize application state
    let state = AppState::new().await?;
    tracing::info!(media_root = %state.media.root().display(), "Application state initialized");

    for background in Background::all() {
        if !state.media.exists(&background.relative_path()) {
            tracing::warn!(%background, "Background image missing, jobs using it cannot be merged");
        }
    }

    let app = api::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid listen address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
