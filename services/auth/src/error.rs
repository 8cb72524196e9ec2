//! Error types for the authenticated client

use std::time::Duration;

use common::error::StorageError;
use reqwest::StatusCode;
use thiserror::Error;

/// Why a refresh-token exchange did not produce a new session
///
/// Cloned to every caller that was waiting on the same exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The backend refused the refresh token
    #[error("refresh token rejected with status {status}")]
    Rejected { status: u16 },

    /// The backend is unreachable or reported itself unavailable
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),

    /// The exchange did not finish in time
    #[error("refresh exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something that is not a token pair
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The new tokens could not be persisted
    #[error("failed to persist refreshed session: {0}")]
    Storage(String),

    /// The exchange task stopped before reporting an outcome
    #[error("refresh exchange abandoned")]
    Abandoned,

    /// The session was replaced (logout or new login) while refreshing
    #[error("session changed during refresh")]
    Superseded,
}

impl RefreshError {
    /// Whether this failure ends the session.
    ///
    /// Transient unavailability leaves the stored credentials alone, and a
    /// superseded exchange must not touch the session that replaced it.
    pub fn clears_session(&self) -> bool {
        !matches!(self, RefreshError::Unavailable(_) | RefreshError::Superseded)
    }
}

/// Coarse classification of a failed request, for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session is gone; the user has to log in again
    SessionExpired,
    /// The backend is temporarily unavailable; retrying later may succeed
    Unavailable,
    /// The request was refused even with a fresh access token
    Unauthorized,
    /// An ordinary request error (validation, not found, conflict, ...)
    Request,
    /// A local failure (storage, malformed response)
    Internal,
}

/// Custom error type for the authenticated client
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced an HTTP response
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("request failed with status {status}")]
    Status {
        status: StatusCode,
        body: serde_json::Value,
    },

    /// Recovering from an expired access token failed
    #[error("session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Session storage error
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request descriptor could not be turned into an HTTP request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A successful response is missing data the client needs
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// HTTP status of the failure, if the backend answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Backend message carried in an error body, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status { body, .. } => body.get("message").and_then(|m| m.as_str()),
            _ => None,
        }
    }

    /// Classify the error for display and session handling
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Unavailable,
            ClientError::Status { status, .. } if is_unavailable(*status) => {
                ErrorKind::Unavailable
            }
            ClientError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                ErrorKind::Unauthorized
            }
            ClientError::Status { .. } => ErrorKind::Request,
            ClientError::Refresh(RefreshError::Unavailable(_)) => ErrorKind::Unavailable,
            ClientError::Refresh(_) => ErrorKind::SessionExpired,
            ClientError::Storage(_)
            | ClientError::Decode(_)
            | ClientError::InvalidRequest(_)
            | ClientError::InvalidResponse(_) => ErrorKind::Internal,
        }
    }
}

/// Whether a status belongs to the transient "service unavailable" class
///
/// 503 is the backend's own maintenance/overload signal; 502 and 504 come
/// from a gateway that cannot reach it.
pub fn is_unavailable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Type alias for client results
pub type ClientResult<T> = Result<T, ClientError>;
