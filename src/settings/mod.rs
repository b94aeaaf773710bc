//! # Connection Settings Resolution
//!
//! Builds the effective [`ConnectionSettings`] from two overlapping sources:
//! the `GOVMOMI_*` environment overrides and the stored configuration record.
//! For every field the first non-empty value wins, environment first. The
//! host's environment metadata is attached as-is and takes no part in merging.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{SecretString, StoredConfig};
use crate::errors::{Error, Result};

pub const ENV_URL: &str = "GOVMOMI_URL";
pub const ENV_USERNAME: &str = "GOVMOMI_USERNAME";
pub const ENV_PASSWORD: &str = "GOVMOMI_PASSWORD";
pub const ENV_INSECURE: &str = "GOVMOMI_INSECURE";

/// Environment override values. Empty variables count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub insecure: Option<String>,
}

impl EnvOverrides {
    /// Read the `GOVMOMI_*` variables of this process.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Self {
            url: read(ENV_URL),
            username: read(ENV_USERNAME),
            password: read(ENV_PASSWORD).map(SecretString::new),
            insecure: read(ENV_INSECURE),
        }
    }
}

/// Where overrides come from at each resolution.
#[derive(Debug, Clone, Default)]
pub enum OverrideSource {
    /// The process environment, read on every resolution
    #[default]
    Process,
    /// A fixed set, for tests and embedding
    Fixed(EnvOverrides),
}

impl OverrideSource {
    pub fn load(&self) -> EnvOverrides {
        match self {
            OverrideSource::Process => EnvOverrides::from_env(),
            OverrideSource::Fixed(overrides) => overrides.clone(),
        }
    }
}

/// Deployment metadata supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEnvironment {
    pub plugin_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
}

/// Source of [`PluginEnvironment`]. The lookup may fail.
#[async_trait]
pub trait HostEnvironment: Send + Sync + std::fmt::Debug {
    async fn plugin_env(&self) -> Result<PluginEnvironment>;
}

/// Host environment with fixed metadata.
#[derive(Debug, Clone)]
pub struct StaticHostEnvironment {
    environment: PluginEnvironment,
}

impl StaticHostEnvironment {
    pub fn new(environment: PluginEnvironment) -> Self {
        Self { environment }
    }
}

impl Default for StaticHostEnvironment {
    fn default() -> Self {
        Self::new(PluginEnvironment {
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            host_version: None,
        })
    }
}

#[async_trait]
impl HostEnvironment for StaticHostEnvironment {
    async fn plugin_env(&self) -> Result<PluginEnvironment> {
        Ok(self.environment.clone())
    }
}

/// Effective settings used to build a session provider. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint: Url,
    pub username: String,
    pub password: SecretString,
    pub insecure_tls: bool,
    pub environment: PluginEnvironment,
}

/// `"1"` or case-insensitive `"true"` enable; any other value disables.
pub fn parse_insecure(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Merge overrides onto the stored record. Pure.
pub fn merge_settings(
    env: &EnvOverrides,
    stored: &StoredConfig,
    environment: PluginEnvironment,
) -> Result<ConnectionSettings> {
    let url = first_non_empty(env.url.as_deref(), &stored.url).ok_or(Error::MissingUrl)?;
    let endpoint = Url::parse(url)
        .map_err(|e| Error::InvalidUrl { url: url.to_string(), reason: e.to_string() })?;

    let username = first_non_empty(env.username.as_deref(), &stored.username).unwrap_or_default();

    let password = match &env.password {
        Some(password) if !password.is_empty() => password.clone(),
        _ => stored.password.clone(),
    };

    let insecure_tls = match env.insecure.as_deref() {
        Some(value) if !value.is_empty() => parse_insecure(value),
        _ => stored.insecure,
    };

    Ok(ConnectionSettings {
        endpoint,
        username: username.to_string(),
        password,
        insecure_tls,
        environment,
    })
}

fn first_non_empty<'a>(preferred: Option<&'a str>, fallback: &'a str) -> Option<&'a str> {
    preferred.filter(|value| !value.is_empty()).or(Some(fallback).filter(|value| !value.is_empty()))
}

/// Resolves settings, fetching host metadata once per resolution.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    host: Arc<dyn HostEnvironment>,
}

impl SettingsResolver {
    pub fn new(host: Arc<dyn HostEnvironment>) -> Self {
        Self { host }
    }

    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, env: &EnvOverrides, stored: &StoredConfig) -> Result<ConnectionSettings> {
        let environment = self
            .host
            .plugin_env()
            .await
            .map_err(|e| match e {
                Error::EnvironmentUnavailable(_) => e,
                other => Error::EnvironmentUnavailable(other.to_string()),
            })?;

        let settings = merge_settings(env, stored, environment)?;
        tracing::debug!(
            endpoint = %settings.endpoint,
            username = %settings.username,
            insecure = settings.insecure_tls,
            "resolved connection settings"
        );
        Ok(settings)
    }
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::new(Arc::new(StaticHostEnvironment::default()))
    }
}
