//! Authenticated Vault sessions and the process-wide session cache.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, Instrument};

use super::auth::{AuthenticationStrategy, VAULT_NAMESPACE_HEADER, VAULT_TOKEN_HEADER};
use super::config::BackendConfig;
use super::error::{Result, SecretsError};
use super::http::{encode_path, success_body, Transport};
use super::types::SecretString;
use crate::config::settings::DEFAULT_SESSION_CACHE_CAPACITY;
use crate::observability::metrics;
use crate::vault_span;

/// Address, client token, namespace and transport for one backend configuration.
#[derive(Clone)]
pub struct Session {
    address: String,
    token: SecretString,
    namespace: Option<String>,
    transport: Transport,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token", &self.token)
            .finish()
    }
}

impl Session {
    pub fn new(
        address: impl Into<String>,
        token: SecretString,
        namespace: Option<String>,
        transport: Transport,
    ) -> Self {
        Self { address: address.into(), token, namespace, transport }
    }

    /// Authenticates with the strategy the configuration selects.
    pub async fn open(config: &BackendConfig) -> Result<Self> {
        let transport = Transport::from_config(config)?;
        let strategy = AuthenticationStrategy::from_config(config)?;
        let token = strategy
            .authenticate(&transport, config.address(), config.namespace.as_deref())
            .await?;

        Ok(Self::new(config.address(), token, config.namespace.clone(), transport))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Same address and transport, different bearer token.
    pub fn with_token(&self, token: SecretString) -> Self {
        Self { token, ..self.clone() }
    }

    /// Builds a request against `{address}{path}` carrying the token and namespace headers.
    ///
    /// `path` must start with `/`.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .transport
            .client()
            .request(method, format!("{}{}", self.address, path))
            .header(VAULT_TOKEN_HEADER, self.token.expose_secret());

        if let Some(namespace) = &self.namespace {
            request = request.header(VAULT_NAMESPACE_HEADER, namespace);
        }

        request
    }

    /// Sends through the retrying transport.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        self.transport.execute(request).await
    }

    /// Logical read of `path`, returning its key/value data.
    ///
    /// A KV v2 envelope (`data.data` next to `data.metadata`) is unwrapped.
    /// Non-string values are rendered as JSON text.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn read(&self, path: &str) -> Result<HashMap<String, String>> {
        let path = path.trim_start_matches('/');
        let response = self
            .execute(self.request(Method::GET, &format!("/v1/{}", encode_path(path))))
            .instrument(vault_span!("read", path))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SecretsError::not_found(path));
        }

        let body = success_body(response, &format!("Could not read secret at [{}]", path)).await?;
        let document: Value = serde_json::from_str(&body)?;
        let data = extract_data(document);

        debug!(path = %path, key_count = data.len(), "Read secret path");
        Ok(data)
    }
}

fn extract_data(document: Value) -> HashMap<String, String> {
    let data = match document {
        Value::Object(mut root) => root.remove("data").unwrap_or(Value::Null),
        _ => Value::Null,
    };

    let data = match data {
        Value::Object(mut outer)
            if outer.get("data").is_some_and(Value::is_object)
                && outer.get("metadata").is_some_and(Value::is_object) =>
        {
            outer.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    match data {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
        _ => HashMap::new(),
    }
}

type SessionSlot = Arc<OnceCell<Arc<Session>>>;

struct SessionCache {
    entries: HashMap<String, SessionSlot>,
    order: VecDeque<String>,
}

/// Caches one session per distinct backend configuration.
///
/// Keyed by [`BackendConfig::fingerprint`]. The map lock only guards slot
/// lookup and insertion; each slot builds its session at most once, so
/// concurrent calls with the same configuration share one login while a slow
/// login never holds up other configurations. A failed build leaves nothing
/// behind. When full, the oldest entry is evicted.
pub struct SessionProvider {
    cache: Mutex<SessionCache>,
    capacity: usize,
}

impl fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProvider").field("capacity", &self.capacity).finish()
    }
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CACHE_CAPACITY)
    }
}

impl SessionProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(SessionCache { entries: HashMap::new(), order: VecDeque::new() }),
            capacity: capacity.max(1),
        }
    }

    /// Returns the cached session for `config`, building it on first use.
    pub async fn session(&self, config: &BackendConfig) -> Result<Arc<Session>> {
        let key = config.fingerprint();
        let slot = self.slot(&key).await;

        if let Some(session) = slot.get() {
            debug!(address = %session.address(), "Reusing cached vault session");
            return Ok(session.clone());
        }

        let built = slot
            .get_or_try_init(|| async {
                let session = Arc::new(Session::open(config).await?);
                metrics::record_session_built(config.auth_method.as_str()).await;
                info!(
                    address = %session.address(),
                    auth_method = %config.auth_method,
                    "Built vault session"
                );
                Ok::<_, SecretsError>(session)
            })
            .await;

        match built {
            Ok(session) => Ok(session.clone()),
            Err(e) => {
                self.forget(&key, &slot).await;
                Err(e)
            }
        }
    }

    /// Slot for `key`, inserting an empty one (and evicting the oldest) when absent.
    async fn slot(&self, key: &str) -> SessionSlot {
        let mut cache = self.cache.lock().await;

        if let Some(slot) = cache.entries.get(key) {
            return slot.clone();
        }

        while cache.entries.len() >= self.capacity {
            let Some(oldest) = cache.order.pop_front() else {
                break;
            };
            cache.entries.remove(&oldest);
            debug!("Evicted oldest vault session");
        }

        let slot = SessionSlot::default();
        cache.entries.insert(key.to_string(), slot.clone());
        cache.order.push_back(key.to_string());
        slot
    }

    /// Drops `slot` if it is still the unbuilt entry for `key`.
    async fn forget(&self, key: &str, slot: &SessionSlot) {
        let mut cache = self.cache.lock().await;
        let stale = cache
            .entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());

        if stale {
            cache.entries.remove(key);
            cache.order.retain(|entry| entry != key);
        }
    }

    /// Number of built sessions.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.entries.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.lock().await;
        cache.entries.clear();
        cache.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::http::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_config(address: &str, token: &str) -> BackendConfig {
        serde_json::from_value(json!({
            "VaultUrl": address,
            "VaultPath": "secret/gocd",
            "Token": token
        }))
        .unwrap()
    }

    fn session(address: &str) -> Session {
        Session::new(
            address,
            SecretString::new("s.root"),
            Some("team-a".into()),
            Transport::new(reqwest::Client::new(), RetryPolicy::none()),
        )
    }

    #[test]
    fn test_extract_kv_v1_data() {
        let data = extract_data(json!({"data": {"key1": "secret1", "port": 8200}}));
        assert_eq!(data.get("key1").map(String::as_str), Some("secret1"));
        assert_eq!(data.get("port").map(String::as_str), Some("8200"));
    }

    #[test]
    fn test_extract_kv_v2_envelope() {
        let data = extract_data(json!({
            "data": {"data": {"key1": "secret1"}, "metadata": {"version": 3}}
        }));
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("key1").map(String::as_str), Some("secret1"));
    }

    #[test]
    fn test_extract_keeps_a_plain_key_named_data() {
        let data = extract_data(json!({"data": {"data": "opaque"}}));
        assert_eq!(data.get("data").map(String::as_str), Some("opaque"));
    }

    #[test]
    fn test_extract_missing_data_is_empty() {
        assert!(extract_data(json!({"warnings": null})).is_empty());
    }

    #[tokio::test]
    async fn test_read_sends_token_and_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/gocd"))
            .and(header(VAULT_TOKEN_HEADER, "s.root"))
            .and(header(VAULT_NAMESPACE_HEADER, "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"k": "v"}})))
            .expect(1)
            .mount(&server)
            .await;

        let data = session(&server.uri()).read("secret/gocd").await.unwrap();
        assert_eq!(data.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_read_missing_path_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        let err = session(&server.uri()).read("secret/missing").await.unwrap_err();
        assert!(matches!(err, SecretsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Vault is sealed"))
            .mount(&server)
            .await;

        let err = session(&server.uri()).read("secret/gocd").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_provider_reuses_session_for_equal_config() {
        let provider = SessionProvider::new(4);
        let config = token_config("http://127.0.0.1:8200", "s.root");

        let first = provider.session(&config).await.unwrap();
        let second = provider.session(&config.clone()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_provider_rebuilds_on_changed_config() {
        let provider = SessionProvider::new(4);
        let first = provider.session(&token_config("http://127.0.0.1:8200", "s.one")).await.unwrap();
        let second =
            provider.session(&token_config("http://127.0.0.1:8200", "s.two")).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(provider.len().await, 2);
    }

    #[tokio::test]
    async fn test_provider_evicts_oldest() {
        let provider = SessionProvider::new(2);
        let first_config = token_config("http://127.0.0.1:8200", "s.one");
        let first = provider.session(&first_config).await.unwrap();
        provider.session(&token_config("http://127.0.0.1:8200", "s.two")).await.unwrap();
        provider.session(&token_config("http://127.0.0.1:8200", "s.three")).await.unwrap();

        assert_eq!(provider.len().await, 2);
        let rebuilt = provider.session(&first_config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let provider = SessionProvider::default();
        let config: BackendConfig =
            serde_json::from_value(json!({"VaultUrl": "http://127.0.0.1:8200"})).unwrap();

        assert!(provider.session(&config).await.is_err());
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_read_encodes_path_segments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/gocd/a%3Fb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"k": "v"}})))
            .expect(1)
            .mount(&server)
            .await;

        let data = session(&server.uri()).read("secret/gocd/a?b").await.unwrap();
        assert_eq!(data.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_slow_login_does_not_block_other_configs() {
        let slow_vault = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"auth": {"client_token": "s.approle"}}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&slow_vault)
            .await;

        let provider = Arc::new(SessionProvider::default());
        let approle: BackendConfig = serde_json::from_value(json!({
            "VaultUrl": slow_vault.uri(),
            "VaultPath": "secret/gocd",
            "AuthMethod": "approle",
            "RoleId": "gocd-role",
            "SecretId": "gocd-secret"
        }))
        .unwrap();

        let slow = tokio::spawn({
            let provider = provider.clone();
            async move { provider.session(&approle).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        provider.session(&token_config("http://127.0.0.1:8200", "s.root")).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!slow.is_finished());

        let approle_session = slow.await.unwrap().unwrap();
        assert_eq!(approle_session.address(), slow_vault.uri());
        assert_eq!(provider.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"auth": {"client_token": "s.approle"}}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = SessionProvider::default();
        let config: BackendConfig = serde_json::from_value(json!({
            "VaultUrl": server.uri(),
            "VaultPath": "secret/gocd",
            "AuthMethod": "approle",
            "RoleId": "gocd-role",
            "SecretId": "gocd-secret"
        }))
        .unwrap();

        let (first, second) = tokio::join!(provider.session(&config), provider.session(&config));
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }
}
