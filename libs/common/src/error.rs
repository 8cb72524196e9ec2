//! Custom error types for the common library
//!
//! This module defines the errors raised by the session storage backends
//! and by client configuration loading.

use thiserror::Error;

/// Custom error type for session storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error reading or writing a storage file
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error talking to Redis
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;

/// Custom error type for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was present but not acceptable
    #[error("Invalid configuration value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Type alias for Result with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
