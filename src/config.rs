use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::github::DEFAULT_API_URL;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Port the HTTP server listens on
    pub port: ConfigValue<u16>,
    /// Base URL of the GitHub REST API
    pub github_api_url: ConfigValue<String>,
    /// Quiet period before an edit is saved locally, in milliseconds
    pub debounce_ms: ConfigValue<u64>,
    /// User-Agent sent to GitHub
    pub user_agent: ConfigValue<String>,
    /// GitHub access token used by the CLI
    #[serde(skip_serializing)]
    pub token: Option<ConfigValue<String>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    port: Option<u16>,
    github_api_url: Option<String>,
    debounce_ms: Option<u64>,
    user_agent: Option<String>,
    token: Option<String>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config.config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                config.database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(port) = file_config.port {
                config.port = ConfigValue::new(port, ConfigSource::File);
            }
            if let Some(url) = file_config.github_api_url {
                config.github_api_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(ms) = file_config.debounce_ms {
                config.debounce_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(agent) = file_config.user_agent {
                config.user_agent = ConfigValue::new(agent, ConfigSource::File);
            }
            if let Some(token) = file_config.token {
                config.token = Some(ConfigValue::new(token, ConfigSource::File));
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("GITMARK_DATABASE_PATH") {
            config.database_path =
                ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(port) = std::env::var("GITMARK_PORT") {
            let port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("GITMARK_PORT", port))?;
            config.port = ConfigValue::new(port, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("GITMARK_GITHUB_API_URL") {
            config.github_api_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(ms) = std::env::var("GITMARK_DEBOUNCE_MS") {
            let ms = ms
                .parse()
                .map_err(|_| ConfigError::InvalidValue("GITMARK_DEBOUNCE_MS", ms))?;
            config.debounce_ms = ConfigValue::new(ms, ConfigSource::Environment);
        }
        if let Ok(token) = std::env::var("GITMARK_TOKEN") {
            config.token = Some(ConfigValue::new(token, ConfigSource::Environment));
        }

        Ok(config)
    }

    fn defaults() -> Self {
        Self {
            database_path: ConfigValue::new(
                Self::default_data_dir().join("gitmark.db"),
                ConfigSource::Default,
            ),
            port: ConfigValue::new(8080, ConfigSource::Default),
            github_api_url: ConfigValue::new(DEFAULT_API_URL.to_string(), ConfigSource::Default),
            debounce_ms: ConfigValue::new(1000, ConfigSource::Default),
            user_agent: ConfigValue::new(
                format!("gitmark/{}", env!("CARGO_PKG_VERSION")),
                ConfigSource::Default,
            ),
            token: None,
            config_file: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.value)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/gitmark/
    /// - macOS: ~/Library/Application Support/gitmark/
    /// - Windows: %APPDATA%/gitmark/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gitmark")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/gitmark/
    /// - macOS: ~/Library/Application Support/gitmark/
    /// - Windows: %APPDATA%/gitmark/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gitmark")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidValue(_, _) => None,
        }
    }
}
