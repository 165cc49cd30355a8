//! Batch lookup of key specifications.
//!
//! Keys are processed in input order. A key missing from a readable path is
//! a soft miss and is simply left out of the results. Any failed read or
//! provisioning step fails the whole batch: processing stops and no partial
//! results are returned.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

use super::config::BackendConfig;
use super::engine::SecretEngine;
use super::error::Result;
use super::keyspec::resolve;
use super::session::SessionProvider;
use super::types::SecretResult;
use crate::lookup_span;
use crate::observability::metrics;

/// Lookup request as sent by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupRequest {
    pub configuration: BackendConfig,
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Resolves batches of key specifications against Vault.
#[derive(Debug, Clone)]
pub struct LookupOrchestrator {
    sessions: Arc<SessionProvider>,
}

impl LookupOrchestrator {
    pub fn new(sessions: Arc<SessionProvider>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionProvider> {
        &self.sessions
    }

    /// Runs one lookup call with a fresh engine and cache.
    pub async fn lookup(&self, request: &LookupRequest) -> Result<Vec<SecretResult>> {
        let config = &request.configuration;
        let engine_name = config.secret_engine.as_str();
        let span = lookup_span!(engine_name, request.keys.len(), base_path = %config.base_path());

        let outcome = async {
            config.ensure_usable()?;
            let session = self.sessions.session(config).await?;
            let mut engine = SecretEngine::build(config, session)?;
            resolve_batch(&mut engine, config.base_path(), &request.keys).await
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| match &outcome {
            Ok(results) => {
                info!(found = results.len(), requested = request.keys.len(), "Lookup completed");
            }
            Err(e) => {
                error!(error = %e, "Failed to lookup secrets from vault");
            }
        });

        let label = if outcome.is_ok() { "success" } else { "failure" };
        metrics::record_lookup(engine_name, label).await;
        outcome
    }
}

/// Resolves every key through `engine`, stopping at the first error.
pub async fn resolve_batch(
    engine: &mut SecretEngine,
    base_path: &str,
    keys: &[String],
) -> Result<Vec<SecretResult>> {
    let mut results = Vec::with_capacity(keys.len());

    for spec in keys {
        let resolved = resolve(spec, base_path);
        match engine.get_secret(&resolved.path, &resolved.key).await? {
            Some(value) => results.push(SecretResult::new(spec.clone(), value)),
            None => {
                debug!(key = %spec, path = %resolved.path, "Key not present at path");
                metrics::record_soft_miss().await;
            }
        }
    }

    Ok(results)
}
