use clap::Args;
use std::path::Path;

use gitmark::config::Config;
use gitmark_core::{AccessToken, SyncEngine, SyncError};

use super::{current_user, CommandError, OutputFormat};

/// Log in with a GitHub personal access token
#[derive(Args)]
pub struct LoginCommand {
    /// GitHub access token
    #[arg(long)]
    pub token: String,
}

impl LoginCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let token = AccessToken::new(self.token.trim());
        let viewer = engine
            .gateway()
            .fetch_viewer(Some(&token))
            .await
            .map_err(SyncError::from)?;
        let login = viewer.login.clone();
        engine
            .store()
            .upsert_user(viewer.into_new_user(&token))
            .await?;

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path);
        save_token(token.as_str(), &config_path)?;

        println!("Logged in as {}", login);
        Ok(())
    }
}

/// Show the logged-in GitHub user
#[derive(Args)]
pub struct WhoamiCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl WhoamiCommand {
    pub async fn run(&self, engine: &SyncEngine, config: &Config) -> Result<(), CommandError> {
        let user = current_user(engine, config).await?;
        match self.format {
            OutputFormat::Json => match serde_json::to_string_pretty(&user) {
                Ok(json) => println!("{}", json),
                Err(e) => return Err(CommandError::Config(e.to_string())),
            },
            OutputFormat::Text => {
                println!("{} (GitHub id {})", user.username, user.github_id);
            }
        }
        Ok(())
    }
}

/// Save the token to the config file, keeping other keys
fn save_token(token: &str, config_path: &Path) -> Result<(), CommandError> {
    // Read existing config or create new
    let mut config: serde_yaml::Value = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| CommandError::Io(config_path.to_path_buf(), e))?;
        serde_yaml::from_str(&contents).map_err(|e| CommandError::Config(e.to_string()))?
    } else {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    };

    let mapping = config
        .as_mapping_mut()
        .ok_or_else(|| CommandError::Config("Invalid config format".to_string()))?;
    mapping.insert(
        serde_yaml::Value::String("token".to_string()),
        serde_yaml::Value::String(token.to_string()),
    );

    // Create config directory if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CommandError::Io(parent.to_path_buf(), e))?;
    }

    let yaml = serde_yaml::to_string(&config).map_err(|e| CommandError::Config(e.to_string()))?;
    std::fs::write(config_path, yaml).map_err(|e| CommandError::Io(config_path.to_path_buf(), e))?;

    Ok(())
}
