//! # Configuration Settings
//!
//! Defines the process configuration structure for the secrets backend.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Key-value storage configuration
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// System lease defaults
    #[validate(nested)]
    pub lease: LeaseConfig,

    /// Which session provider implementation to build clients with
    pub provider: ProviderKind,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        if self.lease.default_ttl_seconds > self.lease.max_ttl_seconds {
            return Err(Error::validation(
                "Default lease TTL cannot be greater than the max lease TTL",
            ));
        }

        if let Some(url) = &self.storage.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(Error::validation(
                    "Database URL must start with 'postgres://' or 'postgresql://'",
                ));
            }
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8200 }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Key-value storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// PostgreSQL connection URL; in-memory storage when unset
    pub database_url: Option<String>,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 60, message = "Connect timeout must be between 1 and 60"))]
    pub connect_timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_url: None, max_connections: 10, connect_timeout_seconds: 10 }
    }
}

impl StorageConfig {
    /// Whether records are kept in process memory only
    pub fn is_in_memory(&self) -> bool {
        self.database_url.is_none()
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Tracing service name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "vsphere-secrets".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: 0,
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

/// System lease defaults applied when a role leaves its TTLs at zero
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LeaseConfig {
    #[validate(range(min = 1, message = "Default lease TTL must be at least 1 second"))]
    pub default_ttl_seconds: u64,

    #[validate(range(min = 1, message = "Max lease TTL must be at least 1 second"))]
    pub max_ttl_seconds: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { default_ttl_seconds: 3600, max_ttl_seconds: 12 * 3600 }
    }
}

impl LeaseConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_seconds)
    }
}

/// Session provider implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// vSphere Automation REST API
    #[default]
    Rest,
    /// In-process simulator, for local development
    Simulator,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "simulator" => Ok(Self::Simulator),
            other => Err(Error::config(format!("Unknown session provider '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "127.0.0.1:8200");
        assert!(config.storage.is_in_memory());
        assert_eq!(config.lease.default_ttl(), Duration::from_secs(3600));
        assert_eq!(config.observability.metrics_bind_address(), None);
    }

    #[test]
    fn test_lease_ordering_is_checked() {
        let mut config = AppConfig::default();
        config.lease.default_ttl_seconds = 100;
        config.lease.max_ttl_seconds = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Default lease TTL"));
    }

    #[test]
    fn test_field_validation() {
        let mut config = AppConfig::default();
        config.server.host = String::new();
        assert!(matches!(config.validate(), Err(Error::Validation { .. })));

        let mut config = AppConfig::default();
        config.storage.database_url = Some("mysql://db".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("REST".parse::<ProviderKind>().unwrap(), ProviderKind::Rest);
        assert_eq!("simulator".parse::<ProviderKind>().unwrap(), ProviderKind::Simulator);
        assert!("soap".parse::<ProviderKind>().is_err());
    }
}
