//! Outbound HTTP transport shared by every Vault and GoCD call.
//!
//! [`Transport`] owns a `reqwest::Client` built from the backend configuration
//! (timeouts and TLS material) and re-sends a request while the response status
//! is 400 or above, up to the configured retry count, sleeping a fixed interval
//! between attempts. Connection and timeout failures are returned immediately.

use reqwest::{Certificate, Client, Identity, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::config::{AuthMethod, BackendConfig};
use super::error::{Result, SecretsError};
use crate::observability::metrics;

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self { max_retries, interval }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.max_retries(), config.retry_interval())
    }

    /// Whether a response with `status` should be re-sent.
    ///
    /// Client and server errors are treated alike.
    pub fn should_retry(&self, status: StatusCode, attempt: u32) -> bool {
        status.as_u16() >= 400 && attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// HTTP client plus retry policy.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Builds the transport for a backend configuration.
    ///
    /// `ServerPem` is trusted as an extra root. With `cert` auth the client
    /// certificate and key are presented on every connection.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connection_timeout())
            .timeout(config.read_timeout());

        if let Some(server_pem) = &config.server_pem {
            let certificate = Certificate::from_pem(server_pem.as_bytes()).map_err(|e| {
                SecretsError::config_error(format!("ServerPem is not a valid certificate: {}", e))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        if config.auth_method == AuthMethod::Cert {
            let (Some(client_pem), Some(client_key)) = (&config.client_pem, &config.client_key_pem)
            else {
                return Err(SecretsError::config_error(
                    "ClientPem and ClientKeyPem must not be blank.",
                ));
            };

            let mut bundle = Vec::with_capacity(client_pem.len() + client_key.expose_secret().len() + 1);
            bundle.extend_from_slice(client_key.expose_secret().as_bytes());
            bundle.push(b'\n');
            bundle.extend_from_slice(client_pem.as_bytes());

            let identity = Identity::from_pem(&bundle).map_err(|e| {
                SecretsError::config_error(format!("ClientPem/ClientKeyPem are not usable: {}", e))
            })?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| SecretsError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new(client, RetryPolicy::from_config(config)))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends `request`, retrying on error statuses.
    ///
    /// Returns the last response once it is below 400 or the retries are
    /// spent. I/O failures are not retried.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        let mut attempt = 0u32;
        let mut pending = request;

        loop {
            let retry_copy = pending.try_clone();
            let response = self.client.execute(pending).await?;
            let status = response.status();

            if !self.retry.should_retry(status, attempt) {
                debug!(method = %method, url = %url, status = status.as_u16(), attempt, "Outbound call completed");
                return Ok(response);
            }

            let Some(next) = retry_copy else {
                // Streaming bodies cannot be replayed.
                return Ok(response);
            };

            attempt += 1;
            warn!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                attempt,
                max_retries = self.retry.max_retries,
                "Retrying outbound call after error status"
            );
            metrics::record_transport_retry(status.as_u16()).await;

            tokio::time::sleep(self.retry.interval).await;
            pending = next;
        }
    }
}

/// Reads the body of a response that must be 2xx.
///
/// Non-success statuses become [`SecretsError::Transport`] carrying the status
/// and `"{context}. Due to: {body}"`.
pub async fn success_body(response: Response, context: &str) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(SecretsError::transport(status.as_u16(), format!("{}. Due to: {}", context, body)));
    }

    Ok(body)
}

/// Parses a 2xx response body as JSON.
pub async fn success_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    let body = success_body(response, context).await?;
    Ok(serde_json::from_str(&body)?)
}

/// Percent-encodes one URL path segment, including any `/`, `?` or `#`.
pub fn encode_segment(segment: &str) -> String {
    // form encoding turns spaces into `+`; a literal `+` is already `%2B`
    form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>().replace('+', "%20")
}

/// Percent-encodes each `/`-separated segment of `path`, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}
