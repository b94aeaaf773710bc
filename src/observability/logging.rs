//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured level. JSON output is
//! selected with `VSPHERE_SECRETS_LOG_FORMAT=json`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Create a tracing span for an HTTP request.
///
/// ```rust,ignore
/// let span = request_span!("GET", "/v1/session/web");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a lease callback (renew or revoke).
#[macro_export]
macro_rules! lease_span {
    ($operation:expr, $lease_id:expr) => {
        tracing::info_span!(
            "lease_operation",
            operation = %$operation,
            lease_id = %$lease_id
        )
    };
    ($operation:expr, $lease_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "lease_operation",
            operation = %$operation,
            lease_id = %$lease_id,
            $($field)*
        )
    };
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    let storage = if config.storage.is_in_memory() { "memory" } else { "postgresql" };
    tracing::info!(
        server_address = %config.server.bind_address(),
        storage,
        provider = ?config.provider,
        default_lease_ttl = config.lease.default_ttl_seconds,
        max_lease_ttl = config.lease.max_ttl_seconds,
        metrics_port = config.observability.metrics_port,
        "vSphere secrets backend configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = request_span!("GET", "/v1/session/web");
        let _span = request_span!("POST", "/v1/roles/web", role = "web");
        let _span = lease_span!("renew", "session/web/123");
        let _span = lease_span!("revoke", "session/web/123", secret_type = "session");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&crate::config::AppConfig::default());
    }
}
