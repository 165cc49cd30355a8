//! Backend configuration carried by every lookup request.
//!
//! The host sends the secret configuration as a flat map using GoCD's property
//! names (`VaultUrl`, `VaultPath`, `AuthMethod`, ...). Values usually arrive as
//! strings, including the numeric ones, and unset properties arrive as empty
//! strings, so the deserializers here treat `""` the same as a missing key.

use serde::{de, Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::SecretsError;
use super::types::SecretString;

pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;
/// Upper bound accepted for `MaxRetries`.
pub const MAX_RETRIES_LIMIT: u64 = 10;
pub const DEFAULT_ENTITY_NAME_PREFIX: &str = "gocd-pipeline";

/// How the broker authenticates itself to Vault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum AuthMethod {
    #[default]
    #[serde(rename = "token")]
    Token,
    #[serde(rename = "approle")]
    AppRole,
    #[serde(rename = "cert")]
    Cert,
}

impl AuthMethod {
    pub const SUPPORTED: [&'static str; 3] = ["token", "approle", "cert"];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Token => "token",
            AuthMethod::AppRole => "approle",
            AuthMethod::Cert => "cert",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = SecretsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "token" => Ok(AuthMethod::Token),
            "approle" => Ok(AuthMethod::AppRole),
            "cert" => Ok(AuthMethod::Cert),
            other => Err(SecretsError::config_error(format!(
                "Invalid 'AuthMethod' [{}], should be one of [{}]",
                other,
                Self::SUPPORTED.join(",")
            ))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which secret engine answers the lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SecretEngineKind {
    /// Plain key/value reads.
    #[default]
    #[serde(rename = "secret")]
    Kv,
    /// Pipeline identity provisioning and OIDC token exchange.
    #[serde(rename = "oidc")]
    Oidc,
}

impl SecretEngineKind {
    pub const SUPPORTED: [&'static str; 2] = ["secret", "oidc"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretEngineKind::Kv => "secret",
            SecretEngineKind::Oidc => "oidc",
        }
    }
}

impl FromStr for SecretEngineKind {
    type Err = SecretsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "secret" => Ok(SecretEngineKind::Kv),
            "oidc" => Ok(SecretEngineKind::Oidc),
            other => Err(SecretsError::config_error(format!(
                "Invalid 'SecretEngine' [{}], should be one of [{}]",
                other,
                Self::SUPPORTED.join(",")
            ))),
        }
    }
}

impl fmt::Display for SecretEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-call backend configuration.
///
/// Two configurations are equal iff every field is equal; [`BackendConfig::fingerprint`]
/// is the content hash the session cache is keyed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "VaultUrl", default, deserialize_with = "de_string")]
    pub vault_url: String,

    #[serde(rename = "NameSpace", default, deserialize_with = "de_opt_string")]
    pub namespace: Option<String>,

    #[serde(rename = "VaultPath", default, deserialize_with = "de_string")]
    pub vault_path: String,

    #[serde(rename = "ConnectionTimeout", default, deserialize_with = "de_opt_u64")]
    pub connection_timeout: Option<u64>,

    #[serde(rename = "ReadTimeout", default, deserialize_with = "de_opt_u64")]
    pub read_timeout: Option<u64>,

    #[serde(rename = "MaxRetries", default, deserialize_with = "de_opt_u64")]
    pub max_retries: Option<u64>,

    #[serde(rename = "RetryIntervalMilliseconds", default, deserialize_with = "de_opt_u64")]
    pub retry_interval_ms: Option<u64>,

    #[serde(rename = "AuthMethod", default, deserialize_with = "de_from_str")]
    pub auth_method: AuthMethod,

    #[serde(rename = "Token", default, deserialize_with = "de_opt_secret")]
    pub token: Option<SecretString>,

    #[serde(rename = "RoleId", default, deserialize_with = "de_opt_string")]
    pub role_id: Option<String>,

    #[serde(rename = "SecretId", default, deserialize_with = "de_opt_secret")]
    pub secret_id: Option<SecretString>,

    #[serde(rename = "ClientPem", default, deserialize_with = "de_opt_string")]
    pub client_pem: Option<String>,

    #[serde(rename = "ClientKeyPem", default, deserialize_with = "de_opt_secret")]
    pub client_key_pem: Option<SecretString>,

    #[serde(rename = "ServerPem", default, deserialize_with = "de_opt_string")]
    pub server_pem: Option<String>,

    #[serde(rename = "SecretEngine", default, deserialize_with = "de_from_str")]
    pub secret_engine: SecretEngineKind,

    #[serde(rename = "PipelineTokenAuthBackendRole", default, deserialize_with = "de_opt_string")]
    pub pipeline_token_auth_backend_role: Option<String>,

    #[serde(rename = "PipelinePolicy", default, deserialize_with = "de_policy_list")]
    pub pipeline_policy: Vec<String>,

    #[serde(rename = "GoCDServerUrl", default, deserialize_with = "de_opt_string")]
    pub gocd_server_url: Option<String>,

    #[serde(rename = "GoCDUsername", default, deserialize_with = "de_opt_string")]
    pub gocd_username: Option<String>,

    #[serde(rename = "GoCDPassword", default, deserialize_with = "de_opt_secret")]
    pub gocd_password: Option<SecretString>,

    #[serde(rename = "CustomEntityNamePrefix", default, deserialize_with = "de_opt_string")]
    pub custom_entity_name_prefix: Option<String>,
}

impl BackendConfig {
    /// Configured base path with trailing slashes stripped.
    pub fn base_path(&self) -> &str {
        self.vault_path.trim_end_matches('/')
    }

    /// Vault address without a trailing slash.
    pub fn address(&self) -> &str {
        self.vault_url.trim_end_matches('/')
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT_SECS))
    }

    /// Configured retry count, clamped to [`MAX_RETRIES_LIMIT`].
    pub fn max_retries(&self) -> u32 {
        self.max_retries
            .map(|value| value.min(MAX_RETRIES_LIMIT) as u32)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.unwrap_or(DEFAULT_RETRY_INTERVAL_MS))
    }

    pub fn entity_name_prefix(&self) -> &str {
        self.custom_entity_name_prefix.as_deref().unwrap_or(DEFAULT_ENTITY_NAME_PREFIX)
    }

    /// Content hash over every field, secrets included.
    ///
    /// The digest is only used as an in-process map key and is never logged.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |name: &str, value: Option<&str>| {
            hasher.update(name.as_bytes());
            match value {
                Some(value) => {
                    hasher.update([1u8]);
                    hasher.update((value.len() as u64).to_be_bytes());
                    hasher.update(value.as_bytes());
                }
                None => hasher.update([0u8]),
            }
        };

        let number = |value: Option<u64>| value.map(|v| v.to_string());
        let connection_timeout = number(self.connection_timeout);
        let read_timeout = number(self.read_timeout);
        let max_retries = number(self.max_retries);
        let retry_interval = number(self.retry_interval_ms);
        let policies = self.pipeline_policy.join(",");

        field("VaultUrl", Some(&self.vault_url));
        field("NameSpace", self.namespace.as_deref());
        field("VaultPath", Some(&self.vault_path));
        field("ConnectionTimeout", connection_timeout.as_deref());
        field("ReadTimeout", read_timeout.as_deref());
        field("MaxRetries", max_retries.as_deref());
        field("RetryIntervalMilliseconds", retry_interval.as_deref());
        field("AuthMethod", Some(self.auth_method.as_str()));
        field("Token", self.token.as_ref().map(SecretString::expose_secret));
        field("RoleId", self.role_id.as_deref());
        field("SecretId", self.secret_id.as_ref().map(SecretString::expose_secret));
        field("ClientPem", self.client_pem.as_deref());
        field("ClientKeyPem", self.client_key_pem.as_ref().map(SecretString::expose_secret));
        field("ServerPem", self.server_pem.as_deref());
        field("SecretEngine", Some(self.secret_engine.as_str()));
        field("PipelineTokenAuthBackendRole", self.pipeline_token_auth_backend_role.as_deref());
        field("PipelinePolicy", Some(&policies));
        field("GoCDServerUrl", self.gocd_server_url.as_deref());
        field("GoCDUsername", self.gocd_username.as_deref());
        field("GoCDPassword", self.gocd_password.as_ref().map(SecretString::expose_secret));
        field("CustomEntityNamePrefix", self.custom_entity_name_prefix.as_deref());

        hex::encode(hasher.finalize())
    }

    /// Checks the fields a lookup cannot proceed without.
    ///
    /// Field-level messages for the host's config screen come from
    /// [`crate::secrets::validation`]; this is the last line before network I/O.
    pub fn ensure_usable(&self) -> Result<(), SecretsError> {
        if self.vault_url.trim().is_empty() {
            return Err(SecretsError::config_error("VaultUrl must not be blank."));
        }
        if self.base_path().trim().is_empty() {
            return Err(SecretsError::config_error("VaultPath must not be blank."));
        }
        if self.max_retries.is_some_and(|value| value > MAX_RETRIES_LIMIT) {
            return Err(SecretsError::config_error(format!(
                "MaxRetries must not exceed {}.",
                MAX_RETRIES_LIMIT
            )));
        }

        self.ensure_credentials()?;

        if self.secret_engine == SecretEngineKind::Oidc {
            self.ensure_oidc_settings()?;
        }

        Ok(())
    }

    fn ensure_credentials(&self) -> Result<(), SecretsError> {
        match self.auth_method {
            AuthMethod::Token if self.token.as_ref().map_or(true, SecretString::is_blank) => {
                Err(SecretsError::config_error("Token must not be blank."))
            }
            AuthMethod::AppRole
                if self.role_id.is_none()
                    || self.secret_id.as_ref().map_or(true, SecretString::is_blank) =>
            {
                Err(SecretsError::config_error("RoleId and SecretId must not be blank."))
            }
            AuthMethod::Cert
                if self.client_pem.is_none()
                    || self.client_key_pem.as_ref().map_or(true, SecretString::is_blank) =>
            {
                Err(SecretsError::config_error("ClientPem and ClientKeyPem must not be blank."))
            }
            _ => Ok(()),
        }
    }

    fn ensure_oidc_settings(&self) -> Result<(), SecretsError> {
        let required = [
            ("PipelineTokenAuthBackendRole", self.pipeline_token_auth_backend_role.is_some()),
            ("GoCDServerUrl", self.gocd_server_url.is_some()),
            ("GoCDUsername", self.gocd_username.is_some()),
            ("GoCDPassword", self.gocd_password.as_ref().is_some_and(|p| !p.is_blank())),
        ];

        match required.iter().find(|(_, present)| !present) {
            Some((name, _)) => Err(SecretsError::config_error(format!("{} must not be blank.", name))),
            None => Ok(()),
        }
    }
}

/// Accepts either a JSON string or number and renders it as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Loose {
    fn into_text(self) -> String {
        match self {
            Loose::Text(text) => text,
            Loose::Number(number) => number.to_string(),
            Loose::Bool(flag) => flag.to_string(),
        }
    }
}

fn de_loose<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Loose> = Option::deserialize(deserializer)?;
    Ok(value.map(Loose::into_text).map(|text| text.trim().to_string()).filter(|t| !t.is_empty()))
}

fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_loose(deserializer)?.unwrap_or_default())
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    de_loose(deserializer)
}

fn de_opt_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_loose(deserializer)?.map(SecretString::new))
}

fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match de_loose(deserializer)? {
        Some(text) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a non-negative integer, got '{}'", text))),
        None => Ok(None),
    }
}

fn de_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = SecretsError>,
{
    let text = de_loose(deserializer)?.unwrap_or_default();
    text.parse::<T>().map_err(de::Error::custom)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyList {
    Joined(String),
    List(Vec<String>),
}

fn de_policy_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let policies = match Option::<PolicyList>::deserialize(deserializer)? {
        Some(PolicyList::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        Some(PolicyList::List(list)) => list,
        None => Vec::new(),
    };

    Ok(policies
        .into_iter()
        .map(|policy| policy.trim().to_string())
        .filter(|policy| !policy.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_config() -> BackendConfig {
        serde_json::from_value(json!({
            "VaultUrl": "https://vault.example.com/",
            "VaultPath": "secret/gocd//",
            "AuthMethod": "token",
            "Token": "s.root"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = token_config();
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.retry_interval(), Duration::from_millis(100));
        assert_eq!(config.secret_engine, SecretEngineKind::Kv);
        assert_eq!(config.entity_name_prefix(), "gocd-pipeline");
    }

    #[test]
    fn test_numeric_values_from_strings() {
        let config: BackendConfig = serde_json::from_value(json!({
            "VaultUrl": "http://127.0.0.1:8200",
            "ConnectionTimeout": "9",
            "ReadTimeout": 50,
            "MaxRetries": "5",
            "RetryIntervalMilliseconds": "200"
        }))
        .unwrap();

        assert_eq!(config.connection_timeout(), Duration::from_secs(9));
        assert_eq!(config.read_timeout(), Duration::from_secs(50));
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.retry_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let config: BackendConfig = serde_json::from_value(json!({
            "VaultUrl": "http://127.0.0.1:8200",
            "NameSpace": "",
            "AuthMethod": "",
            "SecretEngine": "",
            "MaxRetries": ""
        }))
        .unwrap();

        assert!(config.namespace.is_none());
        assert_eq!(config.auth_method, AuthMethod::Token);
        assert_eq!(config.secret_engine, SecretEngineKind::Kv);
        assert_eq!(config.max_retries(), 0);
    }

    #[test]
    fn test_unsupported_auth_method_rejected() {
        let result = serde_json::from_value::<BackendConfig>(json!({
            "VaultUrl": "http://127.0.0.1:8200",
            "AuthMethod": "kerberos"
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid 'AuthMethod'"));
    }

    #[test]
    fn test_paths_are_trimmed() {
        let config = token_config();
        assert_eq!(config.base_path(), "secret/gocd");
        assert_eq!(config.address(), "https://vault.example.com");
    }

    #[test]
    fn test_policy_list_forms() {
        let joined: BackendConfig =
            serde_json::from_value(json!({"PipelinePolicy": "read-gocd, deploy ,"})).unwrap();
        assert_eq!(joined.pipeline_policy, vec!["read-gocd", "deploy"]);

        let listed: BackendConfig =
            serde_json::from_value(json!({"PipelinePolicy": ["read-gocd"]})).unwrap();
        assert_eq!(listed.pipeline_policy, vec!["read-gocd"]);
    }

    #[test]
    fn test_fingerprint_tracks_every_field() {
        let config = token_config();
        let same = token_config();
        assert_eq!(config, same);
        assert_eq!(config.fingerprint(), same.fingerprint());

        let mut rotated = token_config();
        rotated.token = Some(SecretString::new("s.rotated"));
        assert_ne!(config, rotated);
        assert_ne!(config.fingerprint(), rotated.fingerprint());

        let mut unset_namespace = token_config();
        unset_namespace.namespace = Some(String::new());
        assert_ne!(config.fingerprint(), unset_namespace.fingerprint());
    }

    #[test]
    fn test_ensure_usable() {
        assert!(token_config().ensure_usable().is_ok());

        let mut missing_token = token_config();
        missing_token.token = None;
        assert!(matches!(missing_token.ensure_usable(), Err(SecretsError::ConfigError { .. })));

        let mut approle = token_config();
        approle.auth_method = AuthMethod::AppRole;
        approle.role_id = Some("role".into());
        assert!(approle.ensure_usable().is_err());
        approle.secret_id = Some(SecretString::new("secret"));
        assert!(approle.ensure_usable().is_ok());
    }

    #[test]
    fn test_blank_vault_path_is_unusable() {
        for path in ["", "   ", "/"] {
            let mut config = token_config();
            config.vault_path = path.to_string();
            let err = config.ensure_usable().unwrap_err();
            assert_eq!(err.to_string(), "Configuration error: VaultPath must not be blank.");
        }
    }

    #[test]
    fn test_oidc_settings_checked_for_every_auth_method() {
        let mut config: BackendConfig = serde_json::from_value(json!({
            "VaultUrl": "http://127.0.0.1:8200",
            "VaultPath": "identity/oidc/token",
            "AuthMethod": "approle",
            "RoleId": "gocd-role",
            "SecretId": "gocd-secret",
            "SecretEngine": "oidc",
            "GoCDServerUrl": "http://127.0.0.1:8153",
            "GoCDUsername": "admin",
            "GoCDPassword": "badger"
        }))
        .unwrap();

        let err = config.ensure_usable().unwrap_err();
        assert!(err.to_string().contains("PipelineTokenAuthBackendRole must not be blank."));

        config.pipeline_token_auth_backend_role = Some("gocd-pipeline-role".into());
        assert!(config.ensure_usable().is_ok());

        config.gocd_password = None;
        assert!(config.ensure_usable().unwrap_err().to_string().contains("GoCDPassword"));
    }

    #[test]
    fn test_max_retries_bounded() {
        let mut config = token_config();
        config.max_retries = Some(MAX_RETRIES_LIMIT);
        assert!(config.ensure_usable().is_ok());
        assert_eq!(config.max_retries(), MAX_RETRIES_LIMIT as u32);

        config.max_retries = Some(u64::MAX);
        assert_eq!(config.max_retries(), MAX_RETRIES_LIMIT as u32);
        let err = config.ensure_usable().unwrap_err();
        assert!(err.to_string().contains("MaxRetries must not exceed 10."));
    }
}
