//! # Error Handling
//!
//! Crate-wide error type for process bootstrap and the HTTP boundary. Core
//! lookup failures are [`crate::secrets::SecretsError`] and convert into it.

use crate::secrets::SecretsError;

/// Custom result type for broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the broker
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (Vault, GoCD, listener binding)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<SecretsError> for Error {
    fn from(error: SecretsError) -> Self {
        match error {
            SecretsError::ConfigError { message } => Self::Config(message),
            SecretsError::Transport { .. }
            | SecretsError::HttpError(_)
            | SecretsError::NotFound { .. }
            | SecretsError::AuthenticationFailed { .. } => Self::Transport(error.to_string()),
            SecretsError::SerializationError(_) | SecretsError::Internal { .. } => {
                Self::Internal(error.to_string())
            }
        }
    }
}
