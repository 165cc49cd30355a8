//! Vault identity, sys and token endpoints used during provisioning.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, Instrument};

use super::gocd::PipelineMaterial;
use crate::secrets::auth::AuthEnvelope;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::http::{encode_path, encode_segment, success_body, success_json};
use crate::secrets::session::Session;
use crate::secrets::types::SecretString;
use crate::vault_span;

/// Identity entity as returned by Vault.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct EntityRequest<'a> {
    name: &'a str,
    policies: &'a [String],
    metadata: &'a PipelineMaterial,
}

#[derive(Debug, Serialize)]
struct EntityAliasRequest<'a> {
    name: &'a str,
    canonical_id: &'a str,
    mount_accessor: &'a str,
    custom_metadata: &'a PipelineMaterial,
}

#[derive(Debug, Serialize)]
struct CreateTokenRequest<'a> {
    role_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    policies: Option<&'a [String]>,
    entity_alias: &'a str,
}

#[derive(Debug, Deserialize)]
struct OidcToken {
    token: SecretString,
}

/// Identity API bound to the broker's own session.
#[derive(Debug, Clone)]
pub struct VaultIdentityApi {
    session: Arc<Session>,
}

impl VaultIdentityApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// POST `/v1/identity/entity/name/{name}`.
    ///
    /// `Some` when Vault created the entity and returned it. `None` when the
    /// entity already existed and was updated in place (2xx without a body).
    pub async fn create_pipeline_entity(
        &self,
        entity_name: &str,
        policies: &[String],
        material: &PipelineMaterial,
    ) -> Result<Option<IdentityEntity>> {
        let path = format!("/v1/identity/entity/name/{}", encode_segment(entity_name));
        let request = self
            .session
            .request(Method::POST, &path)
            .json(&EntityRequest { name: entity_name, policies, metadata: material });

        let response =
            self.session.execute(request).instrument(vault_span!("create_entity", path)).await?;
        let status = response.status();
        let body =
            success_body(response, &format!("Could not create entity [{}]", entity_name)).await?;

        if status != StatusCode::OK || body.trim().is_empty() {
            debug!(entity = %entity_name, status = status.as_u16(), "Entity already existed");
            return Ok(None);
        }

        let envelope: DataEnvelope<IdentityEntity> = serde_json::from_str(&body)?;
        Ok(Some(envelope.data))
    }

    /// GET `/v1/identity/entity/name/{name}`.
    pub async fn fetch_pipeline_entity(&self, entity_name: &str) -> Result<IdentityEntity> {
        let path = format!("/v1/identity/entity/name/{}", encode_segment(entity_name));
        let response = self
            .session
            .execute(self.session.request(Method::GET, &path))
            .instrument(vault_span!("fetch_entity", path))
            .await?;

        let envelope: DataEnvelope<IdentityEntity> =
            success_json(response, &format!("Could not fetch entity [{}]", entity_name)).await?;
        Ok(envelope.data)
    }

    /// Accessor of the token auth mount from GET `/v1/sys/auth`.
    pub async fn token_auth_mount_accessor(&self) -> Result<String> {
        let response = self
            .session
            .execute(self.session.request(Method::GET, "/v1/sys/auth"))
            .instrument(vault_span!("list_auth_mounts", "/v1/sys/auth"))
            .await?;

        let mounts: Value =
            success_json(response, "Could not fetch auth mounts own token").await?;
        token_accessor(&mounts).ok_or_else(|| {
            SecretsError::internal("Vault auth mounts do not include the token auth method")
        })
    }

    /// POST `/v1/identity/entity-alias`.
    pub async fn create_pipeline_entity_alias(
        &self,
        alias_name: &str,
        entity_id: &str,
        mount_accessor: &str,
        material: &PipelineMaterial,
    ) -> Result<()> {
        let request = self.session.request(Method::POST, "/v1/identity/entity-alias").json(
            &EntityAliasRequest {
                name: alias_name,
                canonical_id: entity_id,
                mount_accessor,
                custom_metadata: material,
            },
        );

        let response = self
            .session
            .execute(request)
            .instrument(vault_span!("create_entity_alias", "/v1/identity/entity-alias"))
            .await?;
        success_body(response, "Could not create entity alias").await?;
        Ok(())
    }

    /// POST `/v1/auth/token/create/{role}`, returning the pipeline's client token.
    pub async fn assume_pipeline(
        &self,
        role: &str,
        policies: &[String],
        alias_name: &str,
    ) -> Result<SecretString> {
        let path = format!("/v1/auth/token/create/{}", encode_segment(role));
        let request = self.session.request(Method::POST, &path).json(&CreateTokenRequest {
            role_name: role,
            policies: (!policies.is_empty()).then_some(policies),
            entity_alias: alias_name,
        });

        let response =
            self.session.execute(request).instrument(vault_span!("create_token", path)).await?;
        let envelope: AuthEnvelope =
            success_json(response, "Could not create pipeline token").await?;
        Ok(envelope.auth.client_token)
    }

    /// GET the OIDC token endpoint authenticated as the pipeline.
    pub async fn oidc_token(&self, pipeline_token: SecretString, path: &str) -> Result<SecretString> {
        let session = self.session.with_token(pipeline_token);
        let path = oidc_path(path);
        let response = session
            .execute(session.request(Method::GET, &path))
            .instrument(vault_span!("read_oidc_token", path))
            .await?;

        let envelope: DataEnvelope<OidcToken> =
            success_json(response, "Could not read OIDC token").await?;
        Ok(envelope.data.token)
    }
}

/// `/v1/identity/oidc/token/x` stays as is; `identity/oidc/token/x` gains the `/v1/` prefix.
pub fn oidc_path(path: &str) -> String {
    let path = path.strip_prefix("/v1/").unwrap_or(path).trim_start_matches('/');
    format!("/v1/{}", encode_path(path))
}

/// Finds the token auth mount by type, falling back to the `token/` key.
fn token_accessor(mounts: &Value) -> Option<String> {
    let table = match mounts.get("data") {
        Some(Value::Object(data)) if !data.is_empty() => data,
        _ => mounts.as_object()?,
    };

    let by_type = table
        .values()
        .find(|mount| mount.get("type").and_then(Value::as_str) == Some("token"));

    by_type
        .or_else(|| table.get("token/"))
        .and_then(|mount| mount.get("accessor"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
