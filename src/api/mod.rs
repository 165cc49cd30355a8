//! # HTTP API
//!
//! The host dispatcher boundary: secret lookup, configuration validation and
//! a health probe, served with axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, LOOKUP_FAILED_MESSAGE};
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
