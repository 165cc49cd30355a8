//! # Metrics Collection
//!
//! Prometheus counters for lookups, transport retries, session builds and
//! identity provisioning.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Metrics recorder that tracks broker metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of one lookup call (`success`, `failure`, `invalid`)
    pub fn record_lookup(&self, engine: &str, outcome: &str) {
        let labels = [("engine", engine.to_string()), ("outcome", outcome.to_string())];
        counter!("secret_lookups_total", &labels).increment(1);
    }

    /// Record a key absent from a readable path
    pub fn record_soft_miss(&self) {
        counter!("secret_soft_misses_total").increment(1);
    }

    /// Record a retried outbound call
    pub fn record_transport_retry(&self, status: u16) {
        let labels = [("status", status.to_string())];
        counter!("vault_transport_retries_total", &labels).increment(1);
    }

    /// Record the outcome of one identity provisioning run
    pub fn record_identity_provision(&self, outcome: &str) {
        let labels = [("outcome", outcome.to_string())];
        counter!("identity_provisions_total", &labels).increment(1);
    }

    /// Record a freshly built Vault session
    pub fn record_session_built(&self, auth_method: &str) {
        let labels = [("auth_method", auth_method.to_string())];
        counter!("vault_sessions_built_total", &labels).increment(1);
    }

    /// Register descriptions for every counter
    pub fn register_broker_metrics(&self) {
        describe_counter!(
            "secret_lookups_total",
            Unit::Count,
            "Lookup calls grouped by secret engine and outcome"
        );
        describe_counter!(
            "secret_soft_misses_total",
            Unit::Count,
            "Requested keys absent from an otherwise readable path"
        );
        describe_counter!(
            "vault_transport_retries_total",
            Unit::Count,
            "Outbound calls retried after an error status"
        );
        describe_counter!(
            "identity_provisions_total",
            Unit::Count,
            "Pipeline identity provisioning runs grouped by outcome"
        );
        describe_counter!(
            "vault_sessions_built_total",
            Unit::Count,
            "Authenticated Vault sessions built, grouped by auth method"
        );
    }
}

/// Global metrics recorder instance
static METRICS: once_cell::sync::Lazy<Arc<RwLock<Option<MetricsRecorder>>>> =
    once_cell::sync::Lazy::new(|| Arc::new(RwLock::new(None)));

/// Initialize metrics collection and Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name);

    builder
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    let recorder = MetricsRecorder::new();
    {
        let mut metrics = METRICS.write().await;
        *metrics = Some(recorder.clone());
    }

    recorder.register_broker_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

/// Get the global metrics recorder
pub async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

/// Record a lookup outcome using the global metrics recorder
pub async fn record_lookup(engine: &str, outcome: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_lookup(engine, outcome);
    }
}

/// Record a soft miss using the global metrics recorder
pub async fn record_soft_miss() {
    if let Some(metrics) = get_metrics().await {
        metrics.record_soft_miss();
    }
}

/// Record a transport retry using the global metrics recorder
pub async fn record_transport_retry(status: u16) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_transport_retry(status);
    }
}

/// Record an identity provisioning outcome using the global metrics recorder
pub async fn record_identity_provision(outcome: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_identity_provision(outcome);
    }
}

/// Record a session build using the global metrics recorder
pub async fn record_session_built(auth_method: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_session_built(auth_method);
    }
}
