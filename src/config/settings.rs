//! # Configuration Settings
//!
//! Process-level configuration for the broker. Backend configuration arrives
//! per request and lives in [`crate::secrets::BackendConfig`].

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_SESSION_CACHE_CAPACITY: usize = 64;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// HTTP API configuration
    #[validate(nested)]
    pub api: ApiServerConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Maximum number of distinct backend configurations holding a cached session
    #[validate(range(min = 1, message = "Session cache capacity must be at least 1"))]
    pub session_cache_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            observability: ObservabilityConfig::default(),
            session_cache_capacity: DEFAULT_SESSION_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api = ApiServerConfig {
            bind_address: env_or("PIPELINE_VAULT_API_BIND_ADDRESS", defaults.api.bind_address),
            port: env_parse("PIPELINE_VAULT_API_PORT", defaults.api.port)?,
        };

        let observability = ObservabilityConfig {
            enable_metrics: env_parse(
                "PIPELINE_VAULT_ENABLE_METRICS",
                defaults.observability.enable_metrics,
            )?,
            metrics_port: env_parse(
                "PIPELINE_VAULT_METRICS_PORT",
                defaults.observability.metrics_port,
            )?,
            service_name: env_or(
                "PIPELINE_VAULT_SERVICE_NAME",
                defaults.observability.service_name,
            ),
            log_level: env_or("PIPELINE_VAULT_LOG_LEVEL", defaults.observability.log_level),
            json_logging: env_parse(
                "PIPELINE_VAULT_JSON_LOGGING",
                defaults.observability.json_logging,
            )?,
        };

        let config = Self {
            api,
            observability,
            session_cache_capacity: env_parse(
                "PIPELINE_VAULT_SESSION_CACHE_CAPACITY",
                defaults.session_cache_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| Error::config(e.to_string()))?;

        if self.observability.enable_metrics && self.observability.metrics_port == self.api.port {
            return Err(Error::config("API and metrics ports cannot be the same"));
        }

        Ok(())
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub bind_address: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl ApiServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to every metric
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or `EnvFilter` directives
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: 9090,
            service_name: "pipeline-vault".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty()).unwrap_or(default)
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.session_cache_capacity, DEFAULT_SESSION_CACHE_CAPACITY);
    }

    #[test]
    fn test_port_conflict_rejected() {
        let mut config = AppConfig::default();
        config.observability.metrics_port = config.api.port;
        assert!(config.validate().is_err());

        config.observability.enable_metrics = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = AppConfig { session_cache_capacity: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_bind_address() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_bind_address(), Some("0.0.0.0:9090".to_string()));

        let disabled = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert_eq!(disabled.metrics_bind_address(), None);
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("PIPELINE_VAULT_API_PORT", "8181");
        env::set_var("PIPELINE_VAULT_JSON_LOGGING", "true");
        env::set_var("PIPELINE_VAULT_SESSION_CACHE_CAPACITY", "8");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.api.port, 8181);
        assert!(config.observability.json_logging);
        assert_eq!(config.session_cache_capacity, 8);

        env::set_var("PIPELINE_VAULT_API_PORT", "not-a-port");
        assert!(AppConfig::from_env().is_err());

        // Clean up
        env::remove_var("PIPELINE_VAULT_API_PORT");
        env::remove_var("PIPELINE_VAULT_JSON_LOGGING");
        env::remove_var("PIPELINE_VAULT_SESSION_CACHE_CAPACITY");
    }
}
