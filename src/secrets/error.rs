//! Error types for secret lookup and identity provisioning.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while resolving secrets or provisioning identities.
///
/// Every variant except [`SecretsError::ConfigError`] is fatal to the call in
/// progress. A key missing from an otherwise readable path is not an error at
/// all and never produces one of these.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Secret path not found in the backend.
    #[error("Secret path not found: {path}")]
    NotFound { path: String },

    /// Authentication with the secrets backend failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Upstream answered with a non-success status.
    #[error("{message} (status: {status})")]
    Transport { status: u16, message: String },

    /// Configuration error (missing field, unsupported method, bad material URL).
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP request error (connect, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create a transport error carrying the upstream status.
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Self::Transport { status, message: message.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Upstream HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SecretsError::Transport { status, .. } => Some(*status),
            SecretsError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SecretsError {
    fn from(error: reqwest::Error) -> Self {
        Self::HttpError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = SecretsError::not_found("secret/gocd");
        assert!(matches!(err, SecretsError::NotFound { .. }));
        assert_eq!(err.to_string(), "Secret path not found: secret/gocd");

        let err = SecretsError::config_error("VaultUrl must not be blank.");
        assert!(matches!(err, SecretsError::ConfigError { .. }));

        let err = SecretsError::authentication_failed("permission denied");
        assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_transport_error_display_carries_status() {
        let err = SecretsError::transport(503, "Could not create entity alias. Due to: sealed");
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("sealed"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_status_only_for_response_errors() {
        assert_eq!(SecretsError::not_found("a").status(), Some(404));
        assert_eq!(SecretsError::internal("boom").status(), None);
        assert_eq!(SecretsError::HttpError("reset".into()).status(), None);
    }
}
