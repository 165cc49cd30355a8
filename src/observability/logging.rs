//! # Structured Logging
//!
//! Span macros for the lookup and Vault call paths, plus startup logging.
//!
//! Spans never carry secret material: key specifications and paths are
//! recorded, tokens and values are not.

/// Create a tracing span for one lookup call.
///
/// ```rust,ignore
/// let span = lookup_span!("secret", keys.len());
/// let span = lookup_span!("oidc", 1, pipeline = "build-linux");
/// ```
#[macro_export]
macro_rules! lookup_span {
    ($engine:expr, $key_count:expr) => {
        tracing::info_span!(
            "secret_lookup",
            engine = %$engine,
            key_count = $key_count,
            lookup_id = %uuid::Uuid::new_v4()
        )
    };
    ($engine:expr, $key_count:expr, $($field:tt)*) => {
        tracing::info_span!(
            "secret_lookup",
            engine = %$engine,
            key_count = $key_count,
            lookup_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for an outbound Vault or GoCD call.
///
/// ```rust,ignore
/// let span = vault_span!("read", "secret/gocd");
/// ```
#[macro_export]
macro_rules! vault_span {
    ($operation:expr, $path:expr) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $path:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        api_address = %config.api.bind_address(),
        session_cache_capacity = config.session_cache_capacity,
        metrics_enabled = %config.observability.enable_metrics,
        json_logging = %config.observability.json_logging,
        "Pipeline vault broker configuration"
    );
}
