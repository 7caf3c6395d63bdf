use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::schedule::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_DATABASE: &str = "weather_data.db";

pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_BASE_URL: &str = "WEATHER_BASE_URL";
pub const ENV_DATABASE: &str = "WEATHER_DB";

pub fn default_cities() -> Vec<String> {
    ["İstanbul", "Ankara", "İzmir", "Antalya", "Şanlıurfa", "Samsun", "Van"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Everything the weather client needs; passed in explicitly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// `[schedule]` table of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cron expression or shortcut, e.g. "@daily" or "0 30 6 * * *".
    pub cron: String,
    /// Extra attempts after a failed run.
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "@daily".to_string(),
            retries: 1,
            retry_delay_secs: 300,
        }
    }
}

impl ScheduleConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// database = "weather_data.db"
/// cities = ["İstanbul", "Ankara"]
///
/// [schedule]
/// cron = "@daily"
/// retries = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub database: PathBuf,
    /// Single source of the city list for both one-off and scheduled runs.
    pub cities: Vec<String>,
    pub timeout_secs: u64,
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            cities: default_cities(),
            timeout_secs: 10,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `path` (or the platform default), falling back to
    /// defaults when the file does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to `path` (or the platform default), creating parent
    /// directories as needed.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Overlay values from the environment. `lookup` is usually
    /// `|k| std::env::var(k).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(db) = non_empty(ENV_DATABASE) {
            self.database = PathBuf::from(db);
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    /// Client settings, or an error when no credential is configured or the
    /// timeout is zero.
    pub fn client_config(&self) -> Result<ClientConfig> {
        if self.timeout_secs == 0 {
            return Err(anyhow!(
                "timeout_secs must be at least 1; a zero timeout fails every request."
            ));
        }

        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No API key configured.\n\
                     Hint: set {ENV_API_KEY} (environment or .env) or run `weather-etl configure`."
                )
            })?;

        Ok(ClientConfig {
            api_key: api_key.to_owned(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}
