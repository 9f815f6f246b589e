//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MAX_IMAGE_BYTES_LIMIT: usize = 50 * 1024 * 1024;
const MAX_PRELOAD_CONCURRENCY: usize = 64;

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_age_ms` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_image_bytes` is 0 or exceeds 50MB
    /// - `preload_concurrency` is 0 or exceeds 64
    /// - `user_agent` is empty
    /// - `image_base_url` is set but not an http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age_ms == 0 {
            return Err(ConfigError::Invalid { field: "max_age_ms".into(), reason: "must be greater than 0".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_image_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_image_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_image_bytes > MAX_IMAGE_BYTES_LIMIT {
            return Err(ConfigError::Invalid { field: "max_image_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.preload_concurrency == 0 || self.preload_concurrency > MAX_PRELOAD_CONCURRENCY {
            return Err(ConfigError::Invalid {
                field: "preload_concurrency".into(),
                reason: format!("must be between 1 and {MAX_PRELOAD_CONCURRENCY}"),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(base) = &self.image_base_url
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                field: "image_base_url".into(),
                reason: "must be an absolute http(s) URL".into(),
            });
        }

        if self.max_age_ms < self.timeout_ms {
            tracing::warn!(
                max_age_ms = self.max_age_ms,
                timeout_ms = self.timeout_ms,
                "max_age_ms is shorter than the request timeout; entries may expire before a refresh completes"
            );
        }

        Ok(())
    }
}
