use clap::Args;
use std::path::PathBuf;

use gitmark::config::Config;
use gitmark_core::{FileKey, SyncEngine};

use super::{current_user, read_local_file, resolve_repository, CommandError, OutputFormat};

/// Show a file, reading it from GitHub if there is no local draft
#[derive(Args)]
pub struct ShowCommand {
    /// Repository full name (owner/name)
    pub repo: String,

    /// Path of the file in the repository
    pub path: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ShowCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let user = current_user(engine, config).await?;
        let repo = resolve_repository(engine, &user, &self.repo).await?;
        let open = engine
            .open_file(Some(&user.token()), &repo, &self.path)
            .await?;

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&open)
                    .map_err(|e| CommandError::Config(e.to_string()))?;
                println!("{}", json);
            }
            OutputFormat::Text => print!("{}", open.content),
        }
        Ok(())
    }
}

/// Save a local file as the draft for a repository path
#[derive(Args)]
pub struct SaveCommand {
    /// Repository full name (owner/name)
    pub repo: String,

    /// Path of the file in the repository
    pub path: String,

    /// Local file with the new content
    pub file: PathBuf,
}

impl SaveCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let content = read_local_file(&self.file)?;
        let user = current_user(engine, config).await?;
        let repo = resolve_repository(engine, &user, &self.repo).await?;

        engine
            .open_file(Some(&user.token()), &repo, &self.path)
            .await?;
        let key = FileKey::new(repo.id, self.path.clone());
        engine.edit(&key, content)?;
        engine.close_file(&key).await?;

        let snapshot = engine.store().get(repo.id, &self.path).await?;
        match snapshot {
            Some(snapshot) if !snapshot.sha.is_synced() => {
                println!("Saved draft of {} (not yet on GitHub)", self.path)
            }
            Some(snapshot) => println!("Saved draft of {} (base {})", self.path, snapshot.sha),
            None => println!("Saved draft of {}", self.path),
        }
        Ok(())
    }
}

/// Push a local file to GitHub
#[derive(Args)]
pub struct PushCommand {
    /// Repository full name (owner/name)
    pub repo: String,

    /// Path of the file in the repository
    pub path: String,

    /// Local file with the content to push
    pub file: PathBuf,
}

impl PushCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let content = read_local_file(&self.file)?;
        let user = current_user(engine, config).await?;
        let repo = resolve_repository(engine, &user, &self.repo).await?;
        let token = user.token();

        engine.open_file(Some(&token), &repo, &self.path).await?;
        let key = FileKey::new(repo.id, self.path.clone());
        engine.edit(&key, content)?;

        let outcome = engine.push(Some(&token), &repo, &self.path).await;
        // Keep the draft even when the push fails
        engine.close_file(&key).await?;
        let outcome = outcome?;

        let verb = if outcome.created { "Created" } else { "Updated" };
        println!(
            "{} {} in {} ({})",
            verb, self.path, repo.full_name, outcome.snapshot.sha
        );
        Ok(())
    }
}
