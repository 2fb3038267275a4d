//! gitmark: edit Markdown files from GitHub repositories with local,
//! auto-saved drafts.
//!
//! The reconciliation rules live in `gitmark-core`; this crate wires them to
//! SQLite, the GitHub REST API, an HTTP server and a CLI.

pub mod config;
pub mod db;
pub mod github;
pub mod server;

use std::sync::Arc;

use gitmark_core::{EngineConfig, SyncEngine};

use config::Config;
use db::{init_db, SqliteStore};
use github::GitHubGateway;

/// Opens the configured database and builds an engine backed by GitHub.
pub async fn build_engine(config: &Config) -> Result<SyncEngine, sqlx::Error> {
    let pool = init_db(&config.database_path.value).await?;
    tracing::debug!(path = %config.database_path.value.display(), "database ready");

    let store = Arc::new(SqliteStore::new(pool));
    let gateway = Arc::new(GitHubGateway::new(
        config.github_api_url.value.clone(),
        config.user_agent.value.clone(),
    ));
    Ok(SyncEngine::new(
        store,
        gateway,
        EngineConfig {
            debounce: config.debounce(),
        },
    ))
}
