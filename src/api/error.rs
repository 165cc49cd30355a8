use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::Error;
use crate::secrets::SecretsError;

/// Message returned for every failed lookup. Upstream detail stays in the logs.
pub const LOOKUP_FAILED_MESSAGE: &str =
    "Failed to lookup secrets from vault. See logs for more information.";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn lookup_failed() -> Self {
        ApiError::Internal(LOOKUP_FAILED_MESSAGE.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Any failure inside a lookup collapses to the same opaque body.
impl From<SecretsError> for ApiError {
    fn from(_: SecretsError) -> Self {
        ApiError::lookup_failed()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => ApiError::BadRequest(msg),
            Error::Transport(_) | Error::Internal(_) | Error::Io(_) => ApiError::lookup_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_error_is_opaque() {
        let err: ApiError =
            SecretsError::transport(403, "Could not read secret. Due to: permission denied").into();
        match err {
            ApiError::Internal(msg) => assert_eq!(msg, LOOKUP_FAILED_MESSAGE),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::lookup_failed().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let config: ApiError = Error::config("bad").into();
        assert!(matches!(config, ApiError::BadRequest(_)));
    }
}
