//! # Log Subscriber
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` defaulting to the
//! configured level, with plain or JSON formatting.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global log subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Returns an error only
/// for an unparsable level; a subscriber that is already installed (as in
/// integration tests) is left in place.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.log_level),
    }
    .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    // A subscriber installed elsewhere is kept.
    let _ = if config.json_logging {
        tracing::subscriber::set_global_default(
            fmt().json().with_env_filter(filter).with_current_span(true).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(fmt().with_env_filter(filter).finish())
    };

    Ok(())
}
