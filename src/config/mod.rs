//! # Configuration Management
//!
//! Process configuration loaded from `VSPHERE_SECRETS_*` environment variables.
//!
//! This is the configuration of the service itself. The vSphere connection
//! settings are a separate, stored resource (see [`crate::domain::StoredConfig`])
//! that the `GOVMOMI_*` variables override at resolution time.

pub mod settings;

pub use settings::{
    AppConfig, LeaseConfig, ObservabilityConfig, ProviderKind, ServerConfig, StorageConfig,
};

use crate::errors::{Error, Result};

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => {
            raw.parse().map_err(|e| Error::config(format!("Invalid value for {}: {}", name, e)))
        }
        None => Ok(default),
    }
}

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let server = ServerConfig {
            host: env_var("VSPHERE_SECRETS_BIND_ADDRESS").unwrap_or(defaults.server.host),
            port: parse_env("VSPHERE_SECRETS_PORT", defaults.server.port)?,
        };

        let storage = StorageConfig {
            database_url: env_var("VSPHERE_SECRETS_DATABASE_URL"),
            max_connections: parse_env(
                "VSPHERE_SECRETS_DATABASE_MAX_CONNECTIONS",
                defaults.storage.max_connections,
            )?,
            connect_timeout_seconds: parse_env(
                "VSPHERE_SECRETS_DATABASE_CONNECT_TIMEOUT_SECONDS",
                defaults.storage.connect_timeout_seconds,
            )?,
        };

        let observability = ObservabilityConfig {
            service_name: env_var("VSPHERE_SECRETS_SERVICE_NAME")
                .unwrap_or(defaults.observability.service_name),
            log_level: env_var("VSPHERE_SECRETS_LOG_LEVEL")
                .unwrap_or(defaults.observability.log_level),
            json_logging: env_var("VSPHERE_SECRETS_LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.observability.json_logging),
            metrics_port: parse_env(
                "VSPHERE_SECRETS_METRICS_PORT",
                defaults.observability.metrics_port,
            )?,
        };

        let lease = LeaseConfig {
            default_ttl_seconds: parse_env(
                "VSPHERE_SECRETS_DEFAULT_LEASE_TTL",
                defaults.lease.default_ttl_seconds,
            )?,
            max_ttl_seconds: parse_env(
                "VSPHERE_SECRETS_MAX_LEASE_TTL",
                defaults.lease.max_ttl_seconds,
            )?,
        };

        let provider = parse_env("VSPHERE_SECRETS_PROVIDER", defaults.provider)?;

        let config = Self { server, storage, observability, lease, provider };
        config.validate()?;
        Ok(config)
    }
}
