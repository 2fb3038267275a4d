mod auth;
mod config_cmd;
mod file;
mod repo;

pub use auth::{LoginCommand, WhoamiCommand};
pub use config_cmd::ConfigCommand;
pub use file::{PushCommand, SaveCommand, ShowCommand};
pub use repo::{FilesCommand, ReposCommand};

use clap::ValueEnum;
use std::path::PathBuf;

use gitmark::config::Config;
use gitmark_core::{
    AccessToken, RepositoryRecord, StoreError, SyncEngine, SyncError, User,
};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Errors that can occur while running a command
#[derive(Debug)]
pub enum CommandError {
    /// No token configured
    NotLoggedIn,
    /// The repository is not among the user's repositories
    RepositoryNotFound(String),
    /// Reading or writing a local file failed
    Io(PathBuf, std::io::Error),
    /// Config file could not be updated
    Config(String),
    Sync(SyncError),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotLoggedIn => {
                write!(f, "Not logged in. Run 'gitmark login --token <token>' first.")
            }
            CommandError::RepositoryNotFound(name) => {
                write!(f, "Repository '{}' not found", name)
            }
            CommandError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            CommandError::Config(msg) => write!(f, "Config error: {}", msg),
            CommandError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Io(_, e) => Some(e),
            CommandError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        CommandError::Sync(SyncError::StoreFailure(e))
    }
}

/// Returns the configured token
pub fn configured_token(config: &Config) -> Result<AccessToken, CommandError> {
    match &config.token {
        Some(token) if !token.value.is_empty() => Ok(AccessToken::new(token.value.clone())),
        _ => Err(CommandError::NotLoggedIn),
    }
}

/// Resolves the user for the configured token, registering it on first use
pub async fn current_user(engine: &SyncEngine, config: &Config) -> Result<User, CommandError> {
    let token = configured_token(config)?;
    if let Some(user) = engine.store().get_user_by_token(token.as_str()).await? {
        return Ok(user);
    }

    let viewer = engine
        .gateway()
        .fetch_viewer(Some(&token))
        .await
        .map_err(SyncError::from)?;
    Ok(engine.store().upsert_user(viewer.into_new_user(&token)).await?)
}

/// Finds a repository by full name in the reconciled list.
///
/// Falls back to the stored records when GitHub cannot be reached.
pub async fn resolve_repository(
    engine: &SyncEngine,
    user: &User,
    full_name: &str,
) -> Result<RepositoryRecord, CommandError> {
    let repos = match engine.sync_repositories(Some(&user.token()), user.id).await {
        Ok(repos) => repos,
        Err(SyncError::Unavailable(reason)) => {
            tracing::warn!(%reason, "GitHub unavailable, using stored repositories");
            engine.store().list_repositories(user.id).await?
        }
        Err(e) => return Err(e.into()),
    };

    repos
        .into_iter()
        .find(|r| r.full_name == full_name)
        .ok_or_else(|| CommandError::RepositoryNotFound(full_name.to_string()))
}

pub fn read_local_file(path: &std::path::Path) -> Result<String, CommandError> {
    std::fs::read_to_string(path).map_err(|e| CommandError::Io(path.to_path_buf(), e))
}
