//! Pipeline identity provisioning.
//!
//! Mints an OIDC token scoped to one GoCD pipeline. The steps run strictly in
//! order and the first failure aborts the run; steps that already succeeded
//! are not rolled back.
//!
//! 1. Fetch the pipeline's material from GoCD.
//! 2. Create the pipeline's identity entity, or fetch it when it already exists.
//! 3. Look up the token auth mount accessor.
//! 4. Bind an entity alias to that mount.
//! 5. Create a pipeline token through the configured token role.
//! 6. Exchange the pipeline token for an OIDC token.

pub mod gocd;
pub mod vault;

pub use gocd::{GoCdPipelineApi, PipelineMaterial};
pub use vault::{IdentityEntity, VaultIdentityApi};

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::config::BackendConfig;
use super::error::{Result, SecretsError};
use super::session::Session;
use super::types::SecretString;
use crate::observability::metrics;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("WHITESPACE_RUN should be a valid regex pattern"));

/// Lower-cases `pipeline` and collapses whitespace runs into `-`.
pub fn normalize_pipeline_name(pipeline: &str) -> String {
    WHITESPACE_RUN.replace_all(&pipeline.to_lowercase(), "-").into_owned()
}

pub fn entity_name(prefix: &str, pipeline: &str) -> String {
    format!("{}-{}", prefix, normalize_pipeline_name(pipeline))
}

pub fn entity_alias_name(prefix: &str, pipeline: &str) -> String {
    format!("{}-entity-alias-{}", prefix, normalize_pipeline_name(pipeline))
}

/// Runs the six-step provisioning sequence for one pipeline.
#[derive(Debug, Clone)]
pub struct IdentityProvisioner {
    gocd: GoCdPipelineApi,
    vault: VaultIdentityApi,
    entity_prefix: String,
    token_role: String,
    policies: Vec<String>,
}

impl IdentityProvisioner {
    pub fn new(
        gocd: GoCdPipelineApi,
        vault: VaultIdentityApi,
        entity_prefix: impl Into<String>,
        token_role: impl Into<String>,
        policies: Vec<String>,
    ) -> Self {
        Self {
            gocd,
            vault,
            entity_prefix: entity_prefix.into(),
            token_role: token_role.into(),
            policies,
        }
    }

    /// GoCD calls reuse the session's transport, so they share its timeouts and retries.
    pub fn from_config(config: &BackendConfig, session: Arc<Session>) -> Result<Self> {
        let token_role = config.pipeline_token_auth_backend_role.clone().ok_or_else(|| {
            SecretsError::config_error("PipelineTokenAuthBackendRole must not be blank.")
        })?;
        let gocd = GoCdPipelineApi::from_config(config, session.transport().clone())?;

        Ok(Self::new(
            gocd,
            VaultIdentityApi::new(session),
            config.entity_name_prefix(),
            token_role,
            config.pipeline_policy.clone(),
        ))
    }

    /// Provisions the pipeline's identity and returns its OIDC token from `oidc_path`.
    #[instrument(skip(self), fields(role = %self.token_role))]
    pub async fn provision(&self, oidc_path: &str, pipeline: &str) -> Result<SecretString> {
        match self.run(oidc_path, pipeline).await {
            Ok(token) => {
                metrics::record_identity_provision("success").await;
                info!(pipeline = %pipeline, "Provisioned pipeline identity");
                Ok(token)
            }
            Err(e) => {
                metrics::record_identity_provision("failure").await;
                error!(pipeline = %pipeline, error = %e, "Pipeline identity provisioning failed");
                Err(e)
            }
        }
    }

    async fn run(&self, oidc_path: &str, pipeline: &str) -> Result<SecretString> {
        let material = self.gocd.fetch_pipeline_material(pipeline).await?;

        let entity_name = entity_name(&self.entity_prefix, pipeline);
        let entity = match self
            .vault
            .create_pipeline_entity(&entity_name, &self.policies, &material)
            .await?
        {
            Some(created) => created,
            None => self.vault.fetch_pipeline_entity(&entity_name).await?,
        };

        let accessor = self.vault.token_auth_mount_accessor().await?;

        let alias_name = entity_alias_name(&self.entity_prefix, pipeline);
        self.vault
            .create_pipeline_entity_alias(&alias_name, &entity.id, &accessor, &material)
            .await?;

        let pipeline_token =
            self.vault.assume_pipeline(&self.token_role, &self.policies, &alias_name).await?;

        self.vault.oidc_token(pipeline_token, oidc_path).await
    }
}
