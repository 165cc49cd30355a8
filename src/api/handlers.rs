//! HTTP handlers for the host dispatcher boundary.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::{error::ApiError, routes::ApiState};
use crate::secrets::{validation, LookupRequest, SecretResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe.
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse { status: "ok".to_string(), version: crate::VERSION.to_string() }),
    )
}

/// Resolves a batch of key specifications.
///
/// Returns the found secrets in request order. Any fatal failure yields a 500
/// with an opaque message and no partial results.
#[instrument(skip_all)]
pub async fn lookup_handler(
    State(state): State<ApiState>,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<Vec<SecretResult>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let results = state.orchestrator.lookup(&request).await?;
    Ok(Json(results))
}

/// Pre-flight configuration check; 412 with field messages when invalid.
#[instrument(skip_all)]
pub async fn validate_handler(
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(configuration) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let result = validation::validate(&validation::properties_from_json(&configuration));
    if result.is_valid() {
        return Ok((StatusCode::OK, Json(result)).into_response());
    }

    info!(error_count = result.errors().len(), "Configuration failed validation");
    Ok((StatusCode::PRECONDITION_FAILED, Json(result)).into_response())
}
