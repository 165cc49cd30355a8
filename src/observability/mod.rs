//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the broker.

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::log_config_info;
pub use metrics::{init_metrics, MetricsRecorder};
pub use tracing::init_logging;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, when enabled, the metrics exporter
pub async fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    if config.enable_metrics {
        init_metrics(config).await?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = %config.enable_metrics,
        "Observability initialized successfully"
    );

    Ok(())
}
