//! Application configuration with layered loading.
//!
//! Uses figment to merge, from lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Environment variables (SWCACHE_*)
//!
//! The loaded [`AppConfig`] is turned once into an immutable
//! [`ControllerConfig`] that is handed to the controller explicitly.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::controller::{BasePath, CacheName, ControllerConfig, DEFAULT_AUDIO_DIR};

mod validation;

pub use validation::ConfigError;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the site is served from, e.g. `https://example.github.io`.
    ///
    /// Set via SWCACHE_ORIGIN.
    #[serde(default)]
    pub origin: Option<String>,

    /// Deployment subpath, `/` or e.g. `/Mens-Group/`.
    ///
    /// Set via SWCACHE_BASE_PATH.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Prefix shared by every cache generation of this application.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix, bumped on each deployment that must invalidate caches.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path segment whose responses are never cached.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Path to the SQLite cache store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_base_path() -> String {
    "/".into()
}

fn default_cache_prefix() -> String {
    "same-battles-".into()
}

fn default_cache_version() -> String {
    "v2".into()
}

fn default_audio_dir() -> String {
    DEFAULT_AUDIO_DIR.into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: None,
            base_path: default_base_path(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            audio_dir: default_audio_dir(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or parsed, or if
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`load`](Self::load).
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into()),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The origin, which has no default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if unset.
    pub fn require_origin(&self) -> Result<Url, ConfigError> {
        let origin = self.origin.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "origin".into(),
            hint: "Set SWCACHE_ORIGIN, e.g. https://example.github.io".into(),
        })?;
        parse_origin(origin)
    }

    /// Build the controller configuration.
    pub fn controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let origin = self.require_origin()?;
        let base_path = BasePath::new(&self.base_path)
            .map_err(|e| ConfigError::Invalid { field: "base_path".into(), reason: e.to_string() })?;
        let cache_name = CacheName::new(&self.cache_prefix, &self.cache_version);

        Ok(ControllerConfig::new(origin, base_path, cache_name).with_audio_dir(&self.audio_dir))
    }
}

pub(crate) fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme: {scheme}") }),
    }
}
