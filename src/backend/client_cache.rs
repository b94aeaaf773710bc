//! Cached session provider with double-checked locking.
//!
//! The backend keeps exactly one `(provider, settings)` pair. Readers share
//! the lock while the client is valid. A miss upgrades to the write lock,
//! re-checks, and only then resolves settings and connects, so concurrent
//! misses build one provider. Expiry is checked lazily on access.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::config_store::ConfigStore;
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::provider::{ProviderFactory, SessionProvider};
use crate::settings::{ConnectionSettings, OverrideSource, SettingsResolver};

/// How long a connected provider is reused. Not configurable.
pub const CLIENT_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// A connected provider and the settings it was built from.
#[derive(Debug, Clone)]
pub struct CachedClient {
    provider: Arc<dyn SessionProvider>,
    settings: Arc<ConnectionSettings>,
    expires_at: Instant,
}

impl CachedClient {
    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.provider
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Default)]
struct CacheState {
    client: Option<CachedClient>,
    settings: Option<Arc<ConnectionSettings>>,
}

impl CacheState {
    fn valid_client(&self) -> Option<CachedClient> {
        self.client.as_ref().filter(|client| client.is_valid()).cloned()
    }
}

#[derive(Debug)]
pub struct ClientCache {
    state: RwLock<CacheState>,
    resolver: SettingsResolver,
    overrides: OverrideSource,
    factory: Arc<dyn ProviderFactory>,
    lifetime: Duration,
    metrics: MetricsRecorder,
}

impl ClientCache {
    pub fn new(
        resolver: SettingsResolver,
        overrides: OverrideSource,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self::with_lifetime(resolver, overrides, factory, CLIENT_LIFETIME)
    }

    pub(crate) fn with_lifetime(
        resolver: SettingsResolver,
        overrides: OverrideSource,
        factory: Arc<dyn ProviderFactory>,
        lifetime: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            resolver,
            overrides,
            factory,
            lifetime,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Return the cached client, building one if it is missing or expired.
    #[instrument(skip_all)]
    pub async fn get_client(&self, config: &ConfigStore) -> Result<CachedClient> {
        {
            let state = self.state.read().await;
            if let Some(client) = state.valid_client() {
                self.metrics.record_client_cache("hit");
                return Ok(client);
            }
        }

        let mut state = self.state.write().await;
        if let Some(client) = state.valid_client() {
            self.metrics.record_client_cache("hit");
            return Ok(client);
        }
        self.metrics.record_client_cache("miss");

        let settings = match &state.settings {
            Some(settings) => settings.clone(),
            None => {
                let stored = config.get().await.map_err(Error::ConfigLoad)?.unwrap_or_default();
                let settings = Arc::new(self.resolver.resolve(&self.overrides.load(), &stored).await?);
                state.settings = Some(settings.clone());
                settings
            }
        };

        let provider = match self.factory.connect(&settings).await {
            Ok(provider) => provider,
            Err(e) => {
                self.metrics.record_client_construction(false);
                return Err(Error::ProviderConstruction(e));
            }
        };
        self.metrics.record_client_construction(true);

        let client = CachedClient { provider, settings, expires_at: Instant::now() + self.lifetime };
        state.client = Some(client.clone());

        info!(endpoint = %client.settings.endpoint, "connected vSphere client");
        Ok(client)
    }

    /// Drop the cached settings and client; the next access re-resolves.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.client = None;
        state.settings = None;
        debug!("client cache reset");
    }

    /// Whether a valid client is currently cached.
    pub async fn is_warm(&self) -> bool {
        self.state.read().await.valid_client().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoredConfig;
    use crate::provider::{SimulatedOperation, SimulatorFactory, SimulatorProvider};
    use crate::settings::EnvOverrides;
    use crate::storage::InMemoryStorage;

    async fn setup(factory: SimulatorFactory, lifetime: Duration) -> (Arc<ClientCache>, ConfigStore) {
        let config = ConfigStore::new(Arc::new(InMemoryStorage::new()));
        config
            .put(&StoredConfig {
                url: "https://vc.local".into(),
                username: "admin".into(),
                password: "pw".into(),
                insecure: false,
            })
            .await
            .unwrap();

        let cache = ClientCache::with_lifetime(
            SettingsResolver::default(),
            OverrideSource::Fixed(EnvOverrides::default()),
            Arc::new(factory),
            lifetime,
        );
        (Arc::new(cache), config)
    }

    fn simulator() -> Arc<SimulatorProvider> {
        Arc::new(SimulatorProvider::new().with_account("admin", "pw"))
    }

    #[tokio::test]
    async fn test_concurrent_misses_build_one_client() {
        let factory = SimulatorFactory::new(simulator()).with_connect_delay(Duration::from_millis(50));
        let (cache, config) = setup(factory.clone(), CLIENT_LIFETIME).await;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let config = config.clone();
            tasks.push(tokio::spawn(async move { cache.get_client(&config).await.map(|c| c.expires_at()) }));
        }

        let mut expiries = Vec::new();
        for task in tasks {
            expiries.push(task.await.unwrap().unwrap());
        }

        assert_eq!(factory.connections(), 1);
        assert!(expiries.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_reset_forces_re_resolution() {
        let factory = SimulatorFactory::new(simulator());
        let (cache, config) = setup(factory.clone(), CLIENT_LIFETIME).await;

        let first = cache.get_client(&config).await.unwrap();
        assert_eq!(first.settings().endpoint.host_str(), Some("vc.local"));

        config
            .put(&StoredConfig {
                url: "https://other.local".into(),
                username: "admin".into(),
                password: "pw".into(),
                insecure: true,
            })
            .await
            .unwrap();

        // without a reset the old client is still served
        let cached = cache.get_client(&config).await.unwrap();
        assert_eq!(cached.settings().endpoint.host_str(), Some("vc.local"));

        cache.reset().await;
        assert!(!cache.is_warm().await);
        let second = cache.get_client(&config).await.unwrap();
        assert_eq!(second.settings().endpoint.host_str(), Some("other.local"));
        assert!(second.settings().insecure_tls);
        assert_eq!(factory.connections(), 2);
    }

    #[tokio::test]
    async fn test_expired_client_is_rebuilt_with_cached_settings() {
        let factory = SimulatorFactory::new(simulator());
        let (cache, config) = setup(factory.clone(), Duration::from_millis(20)).await;

        cache.get_client(&config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.is_warm().await);

        // settings stay cached across expiry; only the provider is rebuilt
        config.delete().await.unwrap();
        let client = cache.get_client(&config).await.unwrap();
        assert_eq!(client.settings().endpoint.host_str(), Some("vc.local"));
        assert_eq!(factory.connections(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let sim = simulator();
        let factory = SimulatorFactory::new(sim.clone());
        let (cache, config) = setup(factory.clone(), CLIENT_LIFETIME).await;

        sim.fail(SimulatedOperation::Connect).await;
        let err = cache.get_client(&config).await.unwrap_err();
        assert!(matches!(err, Error::ProviderConstruction(_)));

        sim.recover(SimulatedOperation::Connect).await;
        assert!(cache.get_client(&config).await.is_ok());
        assert_eq!(factory.connections(), 1);
    }

    #[tokio::test]
    async fn test_missing_url_reported() {
        let cache = ClientCache::new(
            SettingsResolver::default(),
            OverrideSource::Fixed(EnvOverrides::default()),
            Arc::new(SimulatorFactory::new(simulator())),
        );
        let config = ConfigStore::new(Arc::new(InMemoryStorage::new()));

        let err = cache.get_client(&config).await.unwrap_err();
        assert!(matches!(err, Error::MissingUrl));
    }
}
