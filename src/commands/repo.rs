use clap::Args;

use gitmark::config::Config;
use gitmark_core::SyncEngine;

use super::{current_user, resolve_repository, CommandError, OutputFormat};

/// List your GitHub repositories
#[derive(Args)]
pub struct ReposCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ReposCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let user = current_user(engine, config).await?;
        let repos = engine
            .sync_repositories(Some(&user.token()), user.id)
            .await?;

        if repos.is_empty() {
            println!("No repositories found");
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&repos)
                    .map_err(|e| CommandError::Config(e.to_string()))?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                println!("{:<6}  {:<40}  VISIBILITY", "ID", "REPOSITORY");
                println!("{}", "-".repeat(60));
                for repo in &repos {
                    let visibility = if repo.is_private { "private" } else { "public" };
                    println!("{:<6}  {:<40}  {}", repo.id, repo.full_name, visibility);
                }
                println!("\nTotal: {} repository(ies)", repos.len());
            }
        }
        Ok(())
    }
}

/// List Markdown files in a repository
#[derive(Args)]
pub struct FilesCommand {
    /// Repository full name (owner/name)
    pub repo: String,
}

impl FilesCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let user = current_user(engine, config).await?;
        let repo = resolve_repository(engine, &user, &self.repo).await?;
        let paths = engine
            .list_markdown_files(Some(&user.token()), &repo)
            .await?;

        if paths.is_empty() {
            println!("No Markdown files in {}", repo.full_name);
        }
        for path in paths {
            println!("{}", path);
        }
        Ok(())
    }
}
