//! # Secrets Backend
//!
//! The credential lifecycle core and the façade the transport calls.
//!
//! ## Components
//!
//! - [`ClientCache`]: one cached, time-limited provider per backend
//! - [`IdentityLockTable`]: per-username serialization of remote session calls
//! - [`ConfigStore`] / [`RoleStore`]: records in the key-value store
//! - [`IssuanceEngine`]: issue, renew and revoke
//!
//! Configuration writes and deletes reset the client cache, so the next
//! access re-resolves settings.

pub mod client_cache;
pub mod config_store;
pub mod issuance;
pub mod locks;
pub mod roles;

pub use client_cache::{CachedClient, ClientCache, CLIENT_LIFETIME};
pub use config_store::ConfigStore;
pub use issuance::{IssuanceEngine, RevocationOutcome};
pub use locks::{IdentityLockTable, LOCK_SLOTS};
pub use roles::RoleStore;

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{
    normalize_role_name, ConfigUpdate, ConfigView, IssuedSecret, LeaseDefaults, RoleRecord,
    RoleUpdate, RoleView, StoredConfig,
};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::provider::{ProviderError, ProviderFactory};
use crate::settings::{OverrideSource, SettingsResolver};
use crate::storage::Storage;

/// Whether a write may create the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the record, or update it when present
    Create,
    /// Update an existing record only
    Update,
}

impl WriteMode {
    fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Create => "create",
            WriteMode::Update => "update",
        }
    }
}

#[derive(Debug)]
pub struct Backend {
    config: ConfigStore,
    roles: RoleStore,
    cache: Arc<ClientCache>,
    engine: IssuanceEngine,
    metrics: MetricsRecorder,
}

impl Backend {
    /// Backend reading overrides from the process environment.
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ProviderFactory>,
        lease_defaults: LeaseDefaults,
    ) -> Self {
        Self::with_components(
            storage,
            factory,
            SettingsResolver::default(),
            OverrideSource::Process,
            lease_defaults,
        )
    }

    pub fn with_components(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ProviderFactory>,
        resolver: SettingsResolver,
        overrides: OverrideSource,
        lease_defaults: LeaseDefaults,
    ) -> Self {
        let config = ConfigStore::new(storage.clone());
        let roles = RoleStore::new(storage);
        let cache = Arc::new(ClientCache::new(resolver, overrides, factory));
        let engine = IssuanceEngine::new(
            roles.clone(),
            config.clone(),
            cache.clone(),
            Arc::new(IdentityLockTable::new()),
            lease_defaults,
        );

        Self { config, roles, cache, engine, metrics: MetricsRecorder::new() }
    }

    pub fn lease_defaults(&self) -> LeaseDefaults {
        self.engine.lease_defaults()
    }

    pub fn client_cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// The cached provider, connecting first when needed.
    pub async fn client(&self) -> Result<CachedClient> {
        self.cache.get_client(&self.config).await
    }

    /// Clear cached settings and client.
    pub async fn reset(&self) {
        self.cache.reset().await;
    }

    /// Stored configuration without the password; zero values when absent.
    pub async fn read_config(&self) -> Result<ConfigView> {
        Ok(self.config.get().await?.map(|config| config.view()).unwrap_or_default())
    }

    #[instrument(skip(self, update), fields(mode = mode.as_str()))]
    pub async fn write_config(&self, update: ConfigUpdate, mode: WriteMode) -> Result<ConfigView> {
        let mut config = match (self.config.get().await?, mode) {
            (Some(existing), _) => existing,
            (None, WriteMode::Create) => StoredConfig::default(),
            (None, WriteMode::Update) => return Err(Error::missing_for_update("config")),
        };

        config.apply(update);
        config.validate()?;
        self.config.put(&config).await?;
        self.reset().await;

        self.metrics.record_config_update("config", mode.as_str());
        info!(url = %config.url, username = %config.username, "configuration written");
        Ok(config.view())
    }

    #[instrument(skip(self))]
    pub async fn delete_config(&self) -> Result<()> {
        self.config.delete().await?;
        self.reset().await;
        self.metrics.record_config_update("config", "delete");
        Ok(())
    }

    pub async fn list_roles(&self) -> Result<Vec<String>> {
        self.roles.list().await
    }

    pub async fn read_role(&self, name: &str) -> Result<Option<RoleView>> {
        Ok(self.roles.get(name).await?.map(|role| role.view()))
    }

    #[instrument(skip(self, update), fields(role = %name, mode = mode.as_str()))]
    pub async fn write_role(&self, name: &str, update: RoleUpdate, mode: WriteMode) -> Result<RoleView> {
        let name = normalize_role_name(name);
        let mut role = match (self.roles.get(&name).await?, mode) {
            (Some(existing), _) => existing,
            (None, WriteMode::Create) => RoleRecord::default(),
            (None, WriteMode::Update) => return Err(Error::missing_for_update("role entry")),
        };

        role.apply(&name, update);
        role.validate()?;
        self.check_remote_permissions(&role).await?;
        self.roles.put(&name, &role).await?;

        self.metrics.record_config_update("role", mode.as_str());
        info!(credential_type = ?role.credential_mode(), "role written");
        Ok(role.view())
    }

    #[instrument(skip(self), fields(role = %name))]
    pub async fn delete_role(&self, name: &str) -> Result<()> {
        self.roles.delete(name).await?;
        self.metrics.record_config_update("role", "delete");
        Ok(())
    }

    pub async fn issue(&self, role: &str) -> Result<IssuedSecret> {
        self.engine.issue(role).await
    }

    pub async fn renew(&self, secret: &IssuedSecret) -> Result<Option<IssuedSecret>> {
        self.engine.renew(secret).await
    }

    pub async fn revoke(&self, secret: &IssuedSecret) -> Result<RevocationOutcome> {
        self.engine.revoke(secret).await
    }

    /// Reject dynamic roles naming vSphere roles or groups that do not exist.
    ///
    /// Skipped without a stored config, and for providers without lookups.
    async fn check_remote_permissions(&self, role: &RoleRecord) -> Result<()> {
        if !role.has_permissions() {
            return Ok(());
        }
        if self.config.get().await?.is_none() {
            debug!("no configuration stored, skipping remote permission checks");
            return Ok(());
        }

        let client = self.client().await?;
        let provider = client.provider();

        for name in &role.permission_roles {
            match provider.role_exists(name).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::validation_field(
                        format!("no role found for role_name: '{}'", name),
                        "permission_roles",
                    ))
                }
                Err(ProviderError::Unsupported { .. }) => {
                    debug!("provider cannot look up roles, skipping check");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for name in &role.permission_groups {
            match provider.group_exists(name).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::validation_field(
                        format!("no group found for group_name: '{}'", name),
                        "permission_groups",
                    ))
                }
                Err(ProviderError::Unsupported { .. }) => {
                    debug!("provider cannot look up groups, skipping check");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SimulatorFactory, SimulatorProvider};
    use crate::settings::EnvOverrides;
    use crate::storage::InMemoryStorage;

    fn backend() -> (Backend, SimulatorFactory) {
        let sim = SimulatorProvider::new().with_account("admin", "pw").with_role("ReadOnly");
        let factory = SimulatorFactory::new(Arc::new(sim));
        let backend = Backend::with_components(
            Arc::new(InMemoryStorage::new()),
            Arc::new(factory.clone()),
            SettingsResolver::default(),
            OverrideSource::Fixed(EnvOverrides::default()),
            LeaseDefaults::default(),
        );
        (backend, factory)
    }

    fn config_update(url: &str) -> ConfigUpdate {
        ConfigUpdate {
            url: Some(url.into()),
            username: Some("admin".into()),
            password: Some("pw".into()),
            insecure: None,
        }
    }

    #[tokio::test]
    async fn test_config_lifecycle() {
        let (backend, _) = backend();
        assert_eq!(backend.read_config().await.unwrap(), ConfigView::default());

        let err = backend.write_config(config_update("https://vc.local"), WriteMode::Update).await;
        assert!(matches!(err, Err(Error::MissingForUpdate { .. })));

        backend.write_config(config_update("https://vc.local"), WriteMode::Create).await.unwrap();
        let view = backend.read_config().await.unwrap();
        assert_eq!(view.url, "https://vc.local");
        assert_eq!(view.username, "admin");

        backend
            .write_config(
                ConfigUpdate { insecure: Some(true), ..Default::default() },
                WriteMode::Update,
            )
            .await
            .unwrap();
        let view = backend.read_config().await.unwrap();
        assert!(view.insecure);
        assert_eq!(view.url, "https://vc.local");

        backend.delete_config().await.unwrap();
        assert_eq!(backend.read_config().await.unwrap(), ConfigView::default());
    }

    #[tokio::test]
    async fn test_invalid_config_not_persisted() {
        let (backend, _) = backend();
        let err = backend.write_config(config_update("not a url"), WriteMode::Create).await;
        assert!(matches!(err, Err(Error::Validation { .. })));
        assert_eq!(backend.read_config().await.unwrap(), ConfigView::default());
    }

    #[tokio::test]
    async fn test_config_write_resets_client() {
        let (backend, factory) = backend();
        backend.write_config(config_update("https://vc.local"), WriteMode::Create).await.unwrap();

        let before = backend.client().await.unwrap();
        assert_eq!(before.settings().endpoint.host_str(), Some("vc.local"));

        backend.write_config(config_update("https://vc2.local"), WriteMode::Update).await.unwrap();
        assert!(!backend.client_cache().is_warm().await);

        let after = backend.client().await.unwrap();
        assert_eq!(after.settings().endpoint.host_str(), Some("vc2.local"));
        assert_eq!(factory.connections(), 2);
    }

    #[tokio::test]
    async fn test_role_create_update_and_remote_checks() {
        let (backend, _) = backend();

        // no config: remote checks are skipped
        let update =
            RoleUpdate { permission_roles: Some(vec!["Missing".into()]), ..Default::default() };
        backend.write_role("early", update, WriteMode::Create).await.unwrap();

        backend.write_config(config_update("https://vc.local"), WriteMode::Create).await.unwrap();

        let update =
            RoleUpdate { permission_roles: Some(vec!["Missing".into()]), ..Default::default() };
        let err = backend.write_role("web", update, WriteMode::Create).await.unwrap_err();
        assert!(err.to_string().contains("no role found for role_name: 'Missing'"));

        let update = RoleUpdate {
            permission_roles: Some(vec!["ReadOnly".into()]),
            ttl: Some(20),
            ..Default::default()
        };
        let view = backend.write_role("Web", update, WriteMode::Create).await.unwrap();
        assert_eq!(view.username, "web-???");
        assert_eq!(view.ttl, 20);

        let err = backend
            .write_role("db", RoleUpdate::default(), WriteMode::Update)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "role entry not found during update operation");

        let update = RoleUpdate { max_ttl: Some(60), ..Default::default() };
        let view = backend.write_role("web", update, WriteMode::Update).await.unwrap();
        assert_eq!(view.ttl, 20);
        assert_eq!(view.max_ttl, 60);

        assert_eq!(backend.list_roles().await.unwrap(), vec!["early", "web"]);
        backend.delete_role("web").await.unwrap();
        assert!(backend.read_role("web").await.unwrap().is_none());
    }
}
