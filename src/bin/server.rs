//! gitmark HTTP server
//!
//! Serves the editor API on top of a local SQLite draft store and GitHub.
//!
//! # Configuration
//!
//! Read from `~/.config/gitmark/config.yaml` (or `GITMARK_CONFIG`), then
//! overridden by environment variables:
//! - `GITMARK_PORT`: Port to listen on (default: 8080)
//! - `GITMARK_DATABASE_PATH`: SQLite database file
//! - `GITMARK_GITHUB_API_URL`: GitHub API base URL
//! - `GITMARK_DEBOUNCE_MS`: Auto-save delay in milliseconds (default: 1000)
//!
//! See [`gitmark::server`] for the endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;

use gitmark::config::Config;
use gitmark::server::{router, AppState};
use gitmark_core::SaveEvent;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitmark=info,gitmark_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config_path = std::env::var("GITMARK_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path)?;

    tracing::info!("Database: {}", config.database_path.value.display());
    tracing::info!("GitHub API: {}", config.github_api_url.value);

    let engine = gitmark::build_engine(&config).await?;

    // Report background auto-save results
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SaveEvent::Saved { key, sha }) => {
                    tracing::debug!(file = %key, %sha, "auto-saved");
                }
                Ok(SaveEvent::SaveFailed { key, error }) => {
                    tracing::warn!(file = %key, %error, "auto-save failed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "save events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = router(AppState::new(engine)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.value));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
