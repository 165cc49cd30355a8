//! # Pipeline Vault
//!
//! Secret lookup broker between GoCD pipelines and HashiCorp Vault. Resolves
//! the key specifications a pipeline references into Vault values, and can
//! mint per-pipeline OIDC tokens through Vault's identity engine.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API → LookupOrchestrator → SecretEngine (KV | OIDC) → Vault / GoCD
//!                   ↓                    ↓
//!             LookupCache         SessionProvider
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_vault::{api::{start_api_server, ApiState}, secrets::SessionProvider, AppConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let sessions = Arc::new(SessionProvider::new(config.session_cache_capacity));
//!     start_api_server(config.api, ApiState::new(sessions)).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};
pub use observability::init_observability;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
