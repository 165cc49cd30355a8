//! Vault authentication strategies.
//!
//! `token` hands back the configured token without touching the network.
//! `approle` and `cert` log in against their auth mount and return the granted
//! client token.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, Instrument};

use super::config::{AuthMethod, BackendConfig};
use super::error::{Result, SecretsError};
use super::http::{success_json, Transport};
use super::types::SecretString;
use crate::vault_span;

pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
pub const VAULT_NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Credentials needed to obtain a Vault client token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationStrategy {
    Token { token: SecretString },
    AppRole { role_id: String, secret_id: SecretString },
    /// The client certificate is carried by the [`Transport`] itself.
    Cert,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthEnvelope {
    pub auth: AuthBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthBody {
    pub client_token: SecretString,
}

impl AuthenticationStrategy {
    /// Selects the strategy named by `AuthMethod`.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        match config.auth_method {
            AuthMethod::Token => match &config.token {
                Some(token) if !token.is_blank() => Ok(Self::Token { token: token.clone() }),
                _ => Err(SecretsError::config_error("Token must not be blank.")),
            },
            AuthMethod::AppRole => match (&config.role_id, &config.secret_id) {
                (Some(role_id), Some(secret_id)) if !secret_id.is_blank() => {
                    Ok(Self::AppRole { role_id: role_id.clone(), secret_id: secret_id.clone() })
                }
                _ => Err(SecretsError::config_error("RoleId and SecretId must not be blank.")),
            },
            AuthMethod::Cert => Ok(Self::Cert),
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Token { .. } => AuthMethod::Token,
            Self::AppRole { .. } => AuthMethod::AppRole,
            Self::Cert => AuthMethod::Cert,
        }
    }

    /// Produces a client token for `address`.
    #[instrument(skip(self, transport), fields(auth_method = %self.method()))]
    pub async fn authenticate(
        &self,
        transport: &Transport,
        address: &str,
        namespace: Option<&str>,
    ) -> Result<SecretString> {
        let (login_path, body) = match self {
            Self::Token { token } => return Ok(token.clone()),
            Self::AppRole { role_id, secret_id } => (
                "auth/approle/login",
                json!({ "role_id": role_id, "secret_id": secret_id.expose_secret() }),
            ),
            Self::Cert => ("auth/cert/login", json!({})),
        };

        let mut request = transport.client().post(format!("{}/v1/{}", address, login_path)).json(&body);
        if let Some(namespace) = namespace {
            request = request.header(VAULT_NAMESPACE_HEADER, namespace);
        }

        let response =
            transport.execute(request).instrument(vault_span!("login", login_path)).await?;
        let envelope: AuthEnvelope = success_json(response, "Could not log in to vault")
            .await
            .map_err(|e| match e {
                SecretsError::Transport { status, message } => {
                    SecretsError::authentication_failed(format!("{} (status: {})", message, status))
                }
                other => other,
            })?;

        info!(auth_method = %self.method(), "Authenticated to vault");
        Ok(envelope.auth.client_token)
    }
}
