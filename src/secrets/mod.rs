//! Vault secret lookup for GoCD pipelines.
//!
//! This module resolves the key specifications a pipeline references into
//! values stored in HashiCorp Vault, and can mint per-pipeline OIDC tokens.
//!
//! # Architecture
//!
//! - [`keyspec`]: turns `subpath:key` specifications into a Vault path and field
//! - [`session`]: authenticated Vault sessions, reused per configuration
//! - [`cache`]: per-call read cache so each path is fetched at most once
//! - [`engine`]: the `secret` (KV) and `oidc` engines
//! - [`identity`]: the six-step pipeline identity provisioning sequence
//! - [`lookup`]: batch orchestration with soft-miss and fail-fast semantics
//! - [`validation`]: field-level configuration checks for the host
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeline_vault::secrets::{LookupOrchestrator, LookupRequest, SessionProvider};
//!
//! let orchestrator = LookupOrchestrator::new(Arc::new(SessionProvider::default()));
//! let request: LookupRequest = serde_json::from_value(json!({
//!     "configuration": {"VaultUrl": "https://vault:8200", "VaultPath": "secret/gocd", "Token": "s.x"},
//!     "keys": ["key1", "a:key1"]
//! }))?;
//! let results = orchestrator.lookup(&request).await?;
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod identity;
pub mod keyspec;
pub mod lookup;
pub mod session;
pub mod types;
pub mod validation;

pub use auth::AuthenticationStrategy;
pub use cache::{LookupCache, SecretReader};
pub use config::{AuthMethod, BackendConfig, SecretEngineKind};
pub use engine::{KvSecretEngine, OidcSecretEngine, SecretEngine};
pub use error::{Result, SecretsError};
pub use http::{RetryPolicy, Transport};
pub use identity::IdentityProvisioner;
pub use keyspec::{resolve, ResolvedPathKey};
pub use lookup::{resolve_batch, LookupOrchestrator, LookupRequest};
pub use session::{Session, SessionProvider};
pub use types::{SecretResult, SecretString};
pub use validation::{validate, ValidationError, ValidationResult};
