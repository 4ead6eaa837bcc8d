//! Error types for the mailconsole client.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Message shown when a request never got a response.
pub const NETWORK_ERROR_MESSAGE: &str = "A network error occurred.";

/// Message shown when a session could not be recovered.
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please login.";

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by API calls, whether authenticated or not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connection refused, timeout, unreadable body).
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// The server rejected the credentials of an unauthenticated call.
    #[error("{0}")]
    Unauthorized(String),

    /// A 401 arrived and there was no refresh token to recover with.
    #[error("You are not logged in. Please login.")]
    NotAuthenticated,

    /// Refresh failed, or the retried request was rejected again.
    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    SessionExpired,

    /// The response body did not match the expected shape.
    #[error("Unexpected response from the server: {0}")]
    Decode(String),

    /// The request body could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// The caller gave up on the request before it finished.
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// HTTP status associated with this error (`0` when there was no response).
    pub fn status(&self) -> u16 {
        match self {
            Self::Server { status, .. } => *status,
            Self::Unauthorized(_) | Self::NotAuthenticated | Self::SessionExpired => 401,
            Self::Transport(_) | Self::Decode(_) | Self::Encode(_) | Self::Cancelled => 0,
        }
    }

    /// Returns a user-friendly message for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) if msg.is_empty() => NETWORK_ERROR_MESSAGE.to_string(),
            Self::Decode(_) => "Unexpected response from the server. Please try again.".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns true if this error means the session is gone.
    pub fn requires_sign_out(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired)
    }
}

/// Credential storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read credentials: {0}")]
    Read(String),

    #[error("Failed to store credentials: {0}")]
    Write(String),

    #[error("Failed to delete credentials: {0}")]
    Delete(String),

    #[error("Stored credentials are corrupt: {0}")]
    Corrupt(String),
}

impl AppError {
    /// Returns a user-friendly message for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(e) => e.user_message(),
            Self::Store(StoreError::Write(_)) => "Failed to save credentials securely.".to_string(),
            Self::Store(_) => "Saved session could not be read.".to_string(),
            Self::Config(msg) => msg.clone(),
            Self::Io(_) => "An error occurred. Please try again.".to_string(),
        }
    }

    /// Returns true if this error should trigger a sign-out.
    pub fn requires_sign_out(&self) -> bool {
        matches!(self, Self::Api(e) if e.requires_sign_out())
    }
}
