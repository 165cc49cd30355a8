use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::secrets::{LookupOrchestrator, SessionProvider};

use super::handlers::{health_handler, lookup_handler, validate_handler};

#[derive(Debug, Clone)]
pub struct ApiState {
    pub orchestrator: LookupOrchestrator,
}

impl ApiState {
    pub fn new(sessions: Arc<SessionProvider>) -> Self {
        Self { orchestrator: LookupOrchestrator::new(sessions) }
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/secrets/lookup", post(lookup_handler))
        .route("/api/v1/secrets/validate", post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
