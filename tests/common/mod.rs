//! Shared fixtures for integration tests.
//!
//! Provides wiremock-based fakes for:
//! - Vault (KV reads, auth logins, identity endpoints)
//! - GoCD (pipeline and SCM admin API)

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use pipeline_vault::api::{build_router, ApiState};
use pipeline_vault::secrets::SessionProvider;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROOT_TOKEN: &str = "s.root-token";
pub const LOOKUP_PATH: &str = "/api/v1/secrets/lookup";
pub const VALIDATE_PATH: &str = "/api/v1/secrets/validate";

/// Fake Vault server.
pub struct FakeVault {
    pub server: MockServer,
}

impl FakeVault {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Serves `data` at GET `/v1/{secret_path}` for the root token, read exactly `reads` times.
    pub async fn mount_secret(&self, secret_path: &str, data: Value, reads: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}", secret_path)))
            .and(header("X-Vault-Token", ROOT_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .expect(reads)
            .mount(&self.server)
            .await;
    }

    /// Answers GET `/v1/{secret_path}` with `status` and a Vault error body.
    pub async fn mount_failure(&self, secret_path: &str, status: u16, reads: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}", secret_path)))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "errors": ["1 error occurred:\n\t* permission denied\n\n"] })),
            )
            .expect(reads)
            .mount(&self.server)
            .await;
    }

    /// Paths of every request Vault received, in arrival order.
    pub async fn received_paths(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| format!("{} {}", request.method, request.url.path()))
            .collect()
    }
}

/// Fake GoCD server.
pub struct FakeGoCd {
    pub server: MockServer,
}

impl FakeGoCd {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }
}

/// Token-auth KV configuration pointing at `vault_uri`.
pub fn kv_config(vault_uri: &str) -> Value {
    json!({
        "VaultUrl": vault_uri,
        "VaultPath": "secret/gocd",
        "AuthMethod": "token",
        "Token": ROOT_TOKEN,
        "ConnectionTimeout": "2",
        "ReadTimeout": "5"
    })
}

/// Token-auth OIDC configuration for the fake Vault and GoCD servers.
pub fn oidc_config(vault_uri: &str, gocd_uri: &str) -> Value {
    json!({
        "VaultUrl": vault_uri,
        "VaultPath": "identity/oidc/token",
        "AuthMethod": "token",
        "Token": ROOT_TOKEN,
        "SecretEngine": "oidc",
        "PipelineTokenAuthBackendRole": "gocd-pipeline-role",
        "PipelinePolicy": "pipeline-read, pipeline-oidc",
        "GoCDServerUrl": gocd_uri,
        "GoCDUsername": "admin",
        "GoCDPassword": "badger"
    })
}

/// Merges `overrides` into `config`.
pub fn with(mut config: Value, overrides: Value) -> Value {
    if let (Some(target), Some(source)) = (config.as_object_mut(), overrides.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    config
}

pub fn lookup_body(configuration: Value, keys: &[&str]) -> Value {
    json!({ "configuration": configuration, "keys": keys })
}

/// HTTP test server over a fresh session provider.
pub fn test_server() -> TestServer {
    test_server_with(Arc::new(SessionProvider::default()))
}

pub fn test_server_with(sessions: Arc<SessionProvider>) -> TestServer {
    TestServer::new(build_router(ApiState::new(sessions))).expect("test server should start")
}
