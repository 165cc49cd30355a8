//! GoCD pipeline configuration API client.
//!
//! Resolves the version-control material a pipeline is built from. Only the
//! first configured material is used; SCM plugin materials need a second call
//! to read the repository URL from the SCM's configuration entries.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, Instrument};

use crate::secrets::config::BackendConfig;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::http::{encode_segment, success_body, Transport};
use crate::secrets::types::SecretString;
use crate::vault_span;

pub const PIPELINE_CONFIG_MEDIA_TYPE: &str = "application/vnd.go.cd.v11+json";
pub const SCM_MEDIA_TYPE: &str = "application/vnd.go.cd.v4+json";

static SSH_REPOSITORY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^git@[^:/]+:(?P<organization>[^/]+)/(?P<repository>.+?)(?:\.git)?$")
        .expect("SSH_REPOSITORY_URL should be a valid regex pattern")
});

/// Version-control context of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineMaterial {
    #[serde(rename = "pipeline")]
    pub pipeline_name: String,
    pub group: String,
    pub organization: String,
    #[serde(rename = "repository")]
    pub repository_name: String,
    /// Unset for plugin and dependency materials without an explicit branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl PipelineMaterial {
    /// Builds the material from a `git@host:org/repo[.git]` URL.
    pub fn from_repository_url(
        pipeline_name: impl Into<String>,
        group: impl Into<String>,
        branch: Option<String>,
        repository_url: &str,
    ) -> Result<Self> {
        let captures = SSH_REPOSITORY_URL.captures(repository_url.trim()).ok_or_else(|| {
            SecretsError::config_error(format!(
                "Given URL [{}] is not a valid git ssh URL.",
                repository_url
            ))
        })?;

        Ok(Self {
            pipeline_name: pipeline_name.into(),
            group: group.into(),
            organization: captures["organization"].to_string(),
            repository_name: captures["repository"].to_string(),
            branch,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PipelineConfigResponse {
    name: String,
    #[serde(default)]
    group: String,
    #[serde(default)]
    materials: Vec<MaterialResponse>,
}

#[derive(Debug, Deserialize)]
struct MaterialResponse {
    #[serde(rename = "type")]
    material_type: String,
    #[serde(default)]
    attributes: MaterialAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct MaterialAttributes {
    url: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScmResponse {
    #[serde(default, alias = "configurations")]
    configuration: Vec<ScmConfiguration>,
}

#[derive(Debug, Deserialize)]
struct ScmConfiguration {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

/// Basic-authenticated client for GoCD's admin API.
#[derive(Debug, Clone)]
pub struct GoCdPipelineApi {
    transport: Transport,
    base_url: String,
    username: String,
    password: SecretString,
}

impl GoCdPipelineApi {
    pub fn new(
        transport: Transport,
        server_url: &str,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self { transport, base_url: api_base(server_url), username: username.into(), password }
    }

    pub fn from_config(config: &BackendConfig, transport: Transport) -> Result<Self> {
        let server_url = config
            .gocd_server_url
            .as_deref()
            .ok_or_else(|| SecretsError::config_error("GoCDServerUrl must not be blank."))?;
        let username = config
            .gocd_username
            .clone()
            .ok_or_else(|| SecretsError::config_error("GoCDUsername must not be blank."))?;
        let password = config
            .gocd_password
            .clone()
            .ok_or_else(|| SecretsError::config_error("GoCDPassword must not be blank."))?;

        Ok(Self::new(transport, server_url, username, password))
    }

    /// Fetches the pipeline's first material and parses its repository URL.
    #[instrument(skip(self))]
    pub async fn fetch_pipeline_material(&self, pipeline: &str) -> Result<PipelineMaterial> {
        let body = self
            .get(
                &format!("/api/admin/pipelines/{}", encode_segment(pipeline)),
                PIPELINE_CONFIG_MEDIA_TYPE,
                &format!("Could not fetch pipeline configuration for pipeline {}", pipeline),
            )
            .await?;
        let config: PipelineConfigResponse = serde_json::from_str(&body)?;

        let Some(material) = config.materials.into_iter().next() else {
            return Err(SecretsError::config_error(format!(
                "Material configuration for pipeline {} is empty. Can not infer material context.",
                pipeline
            )));
        };

        let repository_url = if material.material_type.eq_ignore_ascii_case("plugin") {
            self.fetch_scm_repository_url(&config.name).await?
        } else {
            material.attributes.url.ok_or_else(|| {
                SecretsError::config_error(format!(
                    "Material configuration for pipeline {} does not contain repository url.",
                    pipeline
                ))
            })?
        };

        debug!(pipeline = %config.name, material_type = %material.material_type, "Resolved pipeline material");
        PipelineMaterial::from_repository_url(
            config.name,
            config.group,
            material.attributes.branch,
            &repository_url,
        )
    }

    async fn fetch_scm_repository_url(&self, name: &str) -> Result<String> {
        let body = self
            .get(
                &format!("/api/admin/scms/{}", encode_segment(name)),
                SCM_MEDIA_TYPE,
                &format!("Could not fetch scm configuration for {}", name),
            )
            .await?;
        let scm: ScmResponse = serde_json::from_str(&body)?;

        if scm.configuration.is_empty() {
            return Err(SecretsError::config_error(format!(
                "Material configuration for scm {} is empty. Can not infer material context.",
                name
            )));
        }

        scm.configuration
            .into_iter()
            .find(|entry| entry.key.eq_ignore_ascii_case("url"))
            .and_then(|entry| entry.value)
            .ok_or_else(|| {
                SecretsError::config_error(format!(
                    "Material configuration for scm {} does not contain repository url.",
                    name
                ))
            })
    }

    async fn get(&self, path: &str, media_type: &str, context: &str) -> Result<String> {
        let request = self
            .transport
            .client()
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, media_type)
            .basic_auth(&self.username, Some(self.password.expose_secret()));

        let response = self.transport.execute(request).instrument(vault_span!("gocd_get", path)).await?;
        success_body(response, context).await
    }
}

/// `https://ci.example.com` and `https://ci.example.com/go/` both become
/// `https://ci.example.com/go`.
fn api_base(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/go") {
        trimmed.to_string()
    } else {
        format!("{}/go", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::http::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> GoCdPipelineApi {
        GoCdPipelineApi::new(
            Transport::new(reqwest::Client::new(), RetryPolicy::none()),
            &server.uri(),
            "admin",
            SecretString::new("badger"),
        )
    }

    #[test]
    fn test_parse_ssh_urls() {
        let material =
            PipelineMaterial::from_repository_url("build", "alpha", None, "git@github.com:gocd/gocd.git")
                .unwrap();
        assert_eq!(material.organization, "gocd");
        assert_eq!(material.repository_name, "gocd");

        let material = PipelineMaterial::from_repository_url(
            "build",
            "alpha",
            Some("main".into()),
            "GIT@GitHub.com:ThoughtWorks/vault-plugin",
        )
        .unwrap();
        assert_eq!(material.organization, "ThoughtWorks");
        assert_eq!(material.repository_name, "vault-plugin");
        assert_eq!(material.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_non_ssh_url_is_config_error() {
        for url in ["https://github.com/gocd/gocd.git", "git@github.com:gocd", ""] {
            let err = PipelineMaterial::from_repository_url("p", "g", None, url).unwrap_err();
            assert!(matches!(err, SecretsError::ConfigError { .. }), "{}", url);
        }
    }

    #[test]
    fn test_api_base() {
        assert_eq!(api_base("https://ci.example.com"), "https://ci.example.com/go");
        assert_eq!(api_base("https://ci.example.com/go/"), "https://ci.example.com/go");
    }

    #[tokio::test]
    async fn test_fetch_git_material() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go/api/admin/pipelines/build-linux"))
            .and(header("accept", PIPELINE_CONFIG_MEDIA_TYPE))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "build-linux",
                "group": "alpha",
                "materials": [
                    {"type": "git", "attributes": {"url": "git@github.com:gocd/gocd.git", "branch": "master"}},
                    {"type": "git", "attributes": {"url": "git@github.com:other/ignored.git"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let material = api(&server).fetch_pipeline_material("build-linux").await.unwrap();
        assert_eq!(
            material,
            PipelineMaterial {
                pipeline_name: "build-linux".into(),
                group: "alpha".into(),
                organization: "gocd".into(),
                repository_name: "gocd".into(),
                branch: Some("master".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_plugin_material_reads_scm_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go/api/admin/pipelines/deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "deploy",
                "group": "beta",
                "materials": [{"type": "plugin", "attributes": {"ref": "scm-id"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/go/api/admin/scms/deploy"))
            .and(header("accept", SCM_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "configuration": [
                    {"key": "branchwhitelist", "value": "main"},
                    {"key": "URL", "value": "git@github.com:acme/deploy.git"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let material = api(&server).fetch_pipeline_material("deploy").await.unwrap();
        assert_eq!(material.organization, "acme");
        assert_eq!(material.repository_name, "deploy");
        assert_eq!(material.branch, None);
    }

    #[tokio::test]
    async fn test_empty_materials_is_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "empty", "group": "g", "materials": []
            })))
            .mount(&server)
            .await;

        let err = api(&server).fetch_pipeline_material("empty").await.unwrap_err();
        assert!(matches!(err, SecretsError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_scm_without_url_is_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go/api/admin/pipelines/deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "deploy", "group": "g",
                "materials": [{"type": "plugin", "attributes": {}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/go/api/admin/scms/deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"configuration": []})))
            .mount(&server)
            .await;

        let err = api(&server).fetch_pipeline_material("deploy").await.unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[tokio::test]
    async fn test_upstream_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = api(&server).fetch_pipeline_material("build").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
