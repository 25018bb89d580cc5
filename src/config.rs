use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const CONFIG_DIR_PREFIX: &str = "logss";
const DEFAULT_PROGRAM_NAME: &str = "logss";

// "anonymous" makes the service treat us as an unregistered application.
const ANONYMOUS_CONSUMER: &str = "anonymous";
pub const FEEDS_SCOPE: &str = "https://spreadsheets.google.com/feeds/";
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OAuthConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub scopes: Vec<String>,
    /// How long to wait for the browser redirect before giving up
    pub callback_timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            consumer_key: ANONYMOUS_CONSUMER.to_string(),
            consumer_secret: ANONYMOUS_CONSUMER.to_string(),
            scopes: vec![FEEDS_SCOPE.to_string()],
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl OAuthConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            return Err(AppError::Config(
                "oauth consumer_key and consumer_secret must not be empty".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(AppError::Config(
                "oauth scopes must list at least one scope".to_string(),
            ));
        }
        if self.callback_timeout_secs == 0 {
            return Err(AppError::Config(
                "oauth callback_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub token_file: Option<PathBuf>,
}

impl Config {
    /// Load the config file, falling back to defaults when there is none.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;

        if !config_path.exists() {
            debug!(path = ?config_path, "No config file, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.oauth.validate()?;

        Ok(config)
    }

    /// Token file to use: the configured one, or `~/.<program>.tok`.
    pub fn token_file(&self, program: &str) -> Result<PathBuf> {
        match &self.store.token_file {
            Some(path) => Ok(path.clone()),
            None => default_token_file(program),
        }
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }
}

/// Default token file location, a dotfile in the home directory named after the program.
pub fn default_token_file(program: &str) -> Result<PathBuf> {
    token_file_in(home::home_dir(), program)
}

fn token_file_in(home: Option<PathBuf>, program: &str) -> Result<PathBuf> {
    home.map(|home| home.join(format!(".{}.tok", program)))
        .ok_or_else(|| AppError::Config("Could not determine home directory".to_string()))
}

/// Base name of the running executable.
pub fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string())
}
