//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (COURSE_CACHE_*)
//! 2. TOML config file (if COURSE_CACHE_CONFIG_FILE set, or passed explicitly)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::StoreLocation;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via COURSE_CACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Default time-to-live for cached entries in milliseconds.
    ///
    /// Set via COURSE_CACHE_MAX_AGE_MS environment variable.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,

    /// User-Agent string for image requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest image body that will be cached.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// Maximum number of redirects followed when fetching an image.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// How many image fetches a preload runs at once.
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,

    /// Origin that root-relative image paths such as `/uploads/a.png` resolve against.
    ///
    /// Set via COURSE_CACHE_IMAGE_BASE_URL environment variable.
    #[serde(default)]
    pub image_base_url: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./course-cache.sqlite")
}

fn default_max_age_ms() -> u64 {
    86_400_000 // 24h
}

fn default_user_agent() -> String {
    "course-cache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_redirects() -> usize {
    5
}

fn default_preload_concurrency() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_age_ms: default_max_age_ms(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_image_bytes: default_max_image_bytes(),
            max_redirects: default_max_redirects(),
            preload_concurrency: default_preload_concurrency(),
            image_base_url: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default entry TTL as Duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Store location for the configured database path.
    pub fn store_location(&self) -> StoreLocation {
        StoreLocation::File(self.db_path.clone())
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `COURSE_CACHE_`
    /// 2. TOML file from `COURSE_CACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed,
    /// or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("COURSE_CACHE_CONFIG_FILE").ok().map(PathBuf::from);
        Self::build(file.as_deref())
    }

    /// Like [`AppConfig::load`], but with an explicit TOML file instead of the environment lookup.
    ///
    /// # Errors
    ///
    /// Unlike the environment lookup, a `config_file` that does not exist is a
    /// `ConfigError::LoadFailed` rather than an empty layer.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_file
            && !path.is_file()
        {
            return Err(ConfigError::LoadFailed(format!("config file not found: {}", path.display())));
        }
        Self::build(config_file)
    }

    fn build(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(
            Env::prefixed("COURSE_CACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
