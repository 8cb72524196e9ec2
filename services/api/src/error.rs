//! Error types for the library client

use auth::error::{ClientError, ErrorKind};
use auth::validator::ValidatorError;
use common::error::{ConfigError, StorageError};
use thiserror::Error;

/// Failures while assembling or running the client
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("session validator error: {0}")]
    Validator(#[from] ValidatorError),
}

/// Type alias for application results
pub type AppResult<T> = Result<T, AppError>;

/// How loudly a failure should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A failure ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

/// Turn a request failure into what the user should read
pub fn notice(err: &ClientError) -> Notice {
    match err.kind() {
        ErrorKind::Unavailable => Notice {
            message: "Cannot connect to the server. Please try again later.".to_string(),
            severity: Severity::Warning,
        },
        ErrorKind::SessionExpired => Notice {
            message: "Your session has expired. Please log in again.".to_string(),
            severity: Severity::Warning,
        },
        ErrorKind::Unauthorized | ErrorKind::Request => Notice {
            message: err
                .message()
                .unwrap_or("An unexpected error occurred.")
                .to_string(),
            severity: Severity::Error,
        },
        ErrorKind::Internal => Notice {
            message: "An unexpected error occurred.".to_string(),
            severity: Severity::Error,
        },
    }
}
