use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::reconcile::DEFAULT_COLLECTION;

pub const ENV_URL: &str = "WEATHERBIT_URL";
pub const ENV_API_KEY: &str = "WEATHERBIT_API_KEY";
pub const ENV_DB_PATH: &str = "WEATHER_DB_PATH";
pub const ENV_COLLECTION: &str = "WEATHER_COLLECTION";

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Forecast endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Full hourly-forecast URL including location query parameters.
    pub url: String,
    /// Sent as the `key` query parameter when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file; the platform data directory is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            collection: default_collection(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [provider]
/// url = "https://api.weatherbit.io/v2.0/forecast/hourly?city=Austin,TX&hours=24"
/// api_key = "..."
///
/// [store]
/// path = "/var/lib/weather/weather.db"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Apply `WEATHERBIT_URL`, `WEATHERBIT_API_KEY`, `WEATHER_DB_PATH` and
    /// `WEATHER_COLLECTION` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Same as [`Config::apply_env_overrides`] with a custom variable lookup.
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_URL) {
            self.set_provider_url(url);
        }
        if let Some(key) = get(ENV_API_KEY) {
            if let Some(provider) = self.provider.as_mut() {
                provider.api_key = Some(key);
            }
        }
        if let Some(path) = get(ENV_DB_PATH) {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Some(collection) = get(ENV_COLLECTION) {
            self.store.collection = collection;
        }
    }

    /// Set/replace the endpoint URL, keeping any API key and timeout.
    pub fn set_provider_url(&mut self, url: impl Into<String>) {
        match self.provider.as_mut() {
            Some(provider) => provider.url = url.into(),
            None => self.provider = Some(ProviderConfig::new(url)),
        }
    }

    pub fn provider_config(&self) -> Result<&ProviderConfig> {
        self.provider
            .as_ref()
            .filter(|p| !p.url.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No forecast endpoint configured.\n\
                     Hint: run `weather-ingest configure` or set {ENV_URL}."
                )
            })
    }

    /// Configured SQLite path, or `weather.db` in the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("weather.db")),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "weather-ingest", "weather-ingest")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}
