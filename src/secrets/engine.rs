//! Secret engines selected by `SecretEngine`.
//!
//! Both variants answer `get_secret(path, key)`. The KV engine reads `path`
//! and returns the value stored under `key`. The OIDC engine treats `key` as
//! a pipeline name and returns that pipeline's OIDC token from `path`.

use std::collections::HashMap;
use std::sync::Arc;

use super::cache::{LookupCache, SecretReader};
use super::config::{BackendConfig, SecretEngineKind};
use super::error::Result;
use super::identity::IdentityProvisioner;
use super::session::Session;

/// Key/value reads through a per-engine [`LookupCache`].
pub struct KvSecretEngine {
    reader: Arc<dyn SecretReader>,
    cache: LookupCache,
}

impl KvSecretEngine {
    pub fn new(reader: Arc<dyn SecretReader>) -> Self {
        Self { reader, cache: LookupCache::new() }
    }

    /// Value of `key` at `path`; `Ok(None)` when the path lacks the key.
    pub async fn get_secret(&mut self, path: &str, key: &str) -> Result<Option<String>> {
        self.cache.get(self.reader.as_ref(), path, key).await
    }

    pub fn reads(&self) -> usize {
        self.cache.reads()
    }
}

/// OIDC tokens minted through [`IdentityProvisioner`].
///
/// A repeated (path, pipeline) pair within one engine reuses the token
/// already minted instead of provisioning again.
pub struct OidcSecretEngine {
    provisioner: IdentityProvisioner,
    minted: HashMap<(String, String), String>,
}

impl OidcSecretEngine {
    pub fn new(provisioner: IdentityProvisioner) -> Self {
        Self { provisioner, minted: HashMap::new() }
    }

    pub async fn get_secret(&mut self, path: &str, pipeline: &str) -> Result<Option<String>> {
        let memo_key = (path.to_string(), pipeline.to_string());
        if let Some(token) = self.minted.get(&memo_key) {
            return Ok(Some(token.clone()));
        }

        let token = self.provisioner.provision(path, pipeline).await?;
        let token = token.expose_secret().to_string();
        self.minted.insert(memo_key, token.clone());
        Ok(Some(token))
    }
}

/// Engine for one lookup call.
pub enum SecretEngine {
    Kv(KvSecretEngine),
    Oidc(OidcSecretEngine),
}

impl SecretEngine {
    pub fn build(config: &BackendConfig, session: Arc<Session>) -> Result<Self> {
        match config.secret_engine {
            SecretEngineKind::Kv => Ok(Self::Kv(KvSecretEngine::new(session))),
            SecretEngineKind::Oidc => {
                Ok(Self::Oidc(OidcSecretEngine::new(IdentityProvisioner::from_config(config, session)?)))
            }
        }
    }

    pub fn kind(&self) -> SecretEngineKind {
        match self {
            Self::Kv(_) => SecretEngineKind::Kv,
            Self::Oidc(_) => SecretEngineKind::Oidc,
        }
    }

    pub async fn get_secret(&mut self, path: &str, key: &str) -> Result<Option<String>> {
        match self {
            Self::Kv(engine) => engine.get_secret(path, key).await,
            Self::Oidc(engine) => engine.get_secret(path, key).await,
        }
    }
}
