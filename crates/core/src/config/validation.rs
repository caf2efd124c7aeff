//! Configuration validation rules.

use crate::config::{AppConfig, parse_origin};
use crate::controller::BasePath;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// The origin may be absent, since commands that only inspect the store
    /// do not need it; `require_origin` reports that case. When present it
    /// must be an http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(origin) = self.origin.as_deref() {
            parse_origin(origin)?;
        }
        BasePath::new(&self.base_path).map_err(|e| invalid("base_path", &e.to_string()))?;
        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.cache_prefix.ends_with(char::is_alphanumeric) {
            tracing::warn!(
                prefix = %self.cache_prefix,
                version = %self.cache_version,
                "cache prefix has no trailing separator; unrelated caches sharing it may be swept on activate"
            );
        }
        if !self.audio_dir.starts_with('/') || !self.audio_dir.ends_with('/') {
            return Err(invalid("audio_dir", "must start and end with '/'"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}
