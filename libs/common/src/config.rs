//! Client configuration
//!
//! Values are layered from built-in defaults, an optional
//! `library-client.{toml,yaml,json}` file in the working directory, and
//! `LIBRARY_*` environment variables (highest precedence).

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Where the session keys are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

/// Configuration for the library client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST backend
    pub api_base_url: String,
    /// Timeout applied to every HTTP request, in seconds
    pub request_timeout_secs: u64,
    /// Upper bound on a single refresh-token exchange, in seconds
    pub refresh_timeout_secs: u64,
    /// Period of the background session validation, in seconds
    pub validation_interval_secs: u64,
    /// Session storage backend
    pub storage_backend: StorageBackend,
    /// Session file, used by the file backend
    pub storage_path: String,
    /// Redis connection URL, used by the redis backend
    pub redis_url: String,
    /// Key namespace, used by the redis backend
    pub redis_key_prefix: String,
}

impl ClientConfig {
    /// Load the configuration from the default sources
    ///
    /// # Environment Variables
    /// - `LIBRARY_API_BASE_URL` (default: "http://localhost:9000/api")
    /// - `LIBRARY_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `LIBRARY_REFRESH_TIMEOUT_SECS` (default: 10)
    /// - `LIBRARY_VALIDATION_INTERVAL_SECS` (default: 60)
    /// - `LIBRARY_STORAGE_BACKEND`: memory, file or redis (default: file)
    /// - `LIBRARY_STORAGE_PATH` (default: ".library-session.json")
    /// - `LIBRARY_REDIS_URL` (default: "redis://localhost:6379")
    /// - `LIBRARY_REDIS_KEY_PREFIX` (default: "library:session:")
    pub fn load() -> ConfigResult<Self> {
        let settings = Config::builder()
            .set_default("api_base_url", "http://localhost:9000/api")?
            .set_default("request_timeout_secs", 30)?
            .set_default("refresh_timeout_secs", 10)?
            .set_default("validation_interval_secs", 60)?
            .set_default("storage_backend", "file")?
            .set_default("storage_path", ".library-session.json")?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("redis_key_prefix", "library:session:")?
            .add_source(File::with_name("library-client").required(false))
            .add_source(Environment::with_prefix("LIBRARY").try_parsing(true))
            .build()?;

        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("refresh_timeout_secs", self.refresh_timeout_secs),
            ("validation_interval_secs", self.validation_interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn validation_interval(&self) -> Duration {
        Duration::from_secs(self.validation_interval_secs)
    }
}
