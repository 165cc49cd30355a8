//! # Configuration Management
//!
//! Process configuration read from `PIPELINE_VAULT_*` environment variables.
//! A `.env` file is honoured by the binary through `dotenvy`.

pub mod settings;

pub use settings::{AppConfig, ApiServerConfig, ObservabilityConfig};
