//! Pre-flight validation of a backend configuration.
//!
//! Validation never fails: it always returns a [`ValidationResult`], empty
//! when the configuration is usable. Messages are keyed by property name so
//! the host can show them next to the offending field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;

use super::config::{AuthMethod, SecretEngineKind, MAX_RETRIES_LIMIT};

pub const KNOWN_PROPERTIES: [&str; 21] = [
    "VaultUrl",
    "NameSpace",
    "VaultPath",
    "ConnectionTimeout",
    "ReadTimeout",
    "MaxRetries",
    "RetryIntervalMilliseconds",
    "AuthMethod",
    "Token",
    "RoleId",
    "SecretId",
    "ClientPem",
    "ClientKeyPem",
    "ServerPem",
    "SecretEngine",
    "PipelineTokenAuthBackendRole",
    "PipelinePolicy",
    "GoCDServerUrl",
    "GoCDUsername",
    "GoCDPassword",
    "CustomEntityNamePrefix",
];

const NUMERIC_PROPERTIES: [&str; 4] =
    ["ConnectionTimeout", "ReadTimeout", "MaxRetries", "RetryIntervalMilliseconds"];

/// One field-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

/// Ordered list of field-level problems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError { key: key.into(), message: message.into() });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn has_error_for(&self, key: &str) -> bool {
        self.errors.iter().any(|error| error.key == key)
    }
}

/// Flattens a JSON configuration object into property strings.
///
/// `null` becomes an empty string; numbers and booleans keep their JSON text.
pub fn properties_from_json(object: &serde_json::Map<String, Value>) -> HashMap<String, String> {
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

fn property<'a>(properties: &'a HashMap<String, String>, key: &str) -> &'a str {
    properties.get(key).map(|value| value.trim()).unwrap_or_default()
}

/// Runs every rule against `properties`.
pub fn validate(properties: &HashMap<String, String>) -> ValidationResult {
    let mut result = ValidationResult::new();
    let require = |result: &mut ValidationResult, key: &str| {
        if property(properties, key).is_empty() {
            result.add(key, format!("{} must not be blank.", key));
        }
    };

    require(&mut result, "VaultUrl");
    if property(properties, "VaultPath").trim_end_matches('/').is_empty() {
        result.add("VaultPath", "VaultPath must not be blank.");
    }

    for key in ["VaultUrl", "GoCDServerUrl"] {
        let url = property(properties, key);
        if !url.is_empty() && Url::parse(url).is_err() {
            result.add(key, format!("{} must be a valid URL.", key));
        }
    }

    for key in NUMERIC_PROPERTIES {
        let number = property(properties, key);
        if !number.is_empty() && number.parse::<u64>().is_err() {
            result.add(key, format!("{} must be a non-negative integer.", key));
        }
    }

    let retries = property(properties, "MaxRetries");
    if retries.parse::<u64>().is_ok_and(|value| value > MAX_RETRIES_LIMIT) {
        result.add("MaxRetries", format!("MaxRetries must not exceed {}.", MAX_RETRIES_LIMIT));
    }

    match property(properties, "AuthMethod").parse::<AuthMethod>() {
        Ok(AuthMethod::Token) => require(&mut result, "Token"),
        Ok(AuthMethod::AppRole) => {
            require(&mut result, "RoleId");
            require(&mut result, "SecretId");
        }
        Ok(AuthMethod::Cert) => {
            require(&mut result, "ClientPem");
            require(&mut result, "ClientKeyPem");
        }
        Err(_) => result.add(
            "AuthMethod",
            format!("Invalid 'AuthMethod', should be one of [{}]", AuthMethod::SUPPORTED.join(",")),
        ),
    }

    match property(properties, "SecretEngine").parse::<SecretEngineKind>() {
        Ok(SecretEngineKind::Kv) => {}
        Ok(SecretEngineKind::Oidc) => {
            for key in
                ["GoCDServerUrl", "GoCDUsername", "GoCDPassword", "PipelineTokenAuthBackendRole"]
            {
                require(&mut result, key);
            }
        }
        Err(_) => result.add(
            "SecretEngine",
            format!(
                "Invalid 'SecretEngine', should be one of [{}]",
                SecretEngineKind::SUPPORTED.join(",")
            ),
        ),
    }

    let unknown: BTreeMap<&str, ()> = properties
        .keys()
        .map(String::as_str)
        .filter(|key| !KNOWN_PROPERTIES.contains(key))
        .map(|key| (key, ()))
        .collect();
    for key in unknown.keys() {
        result.add(*key, "Is an unknown property");
    }

    result
}
