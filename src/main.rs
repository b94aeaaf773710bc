use std::sync::Arc;

use tracing::{info, warn};
use vsphere_secrets::{
    api::start_api_server,
    backend::Backend,
    config::ProviderKind,
    domain::LeaseDefaults,
    observability::{init_observability, log_config_info},
    provider::{ProviderFactory, RestProviderFactory, SimulatorFactory, SimulatorProvider},
    settings::EnvOverrides,
    storage::{InMemoryStorage, PgStorage, Storage},
    AppConfig, Result, APP_NAME, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_observability(&config.observability)?;
    log_config_info(&config);

    info!(app_name = APP_NAME, version = VERSION, "Starting vSphere secrets backend");

    let storage: Arc<dyn Storage> = match config.storage.database_url.as_deref() {
        Some(url) => {
            info!("Connecting to PostgreSQL storage");
            Arc::new(PgStorage::connect(&config.storage, url).await?)
        }
        None => {
            warn!("No database configured, using in-memory storage; state is lost on restart");
            Arc::new(InMemoryStorage::new())
        }
    };

    let factory: Arc<dyn ProviderFactory> = match config.provider {
        ProviderKind::Rest => Arc::new(RestProviderFactory::default()),
        ProviderKind::Simulator => {
            warn!("Using the simulated vSphere provider");
            Arc::new(SimulatorFactory::new(Arc::new(simulator_from_env())))
        }
    };

    let lease_defaults = LeaseDefaults::new(config.lease.default_ttl(), config.lease.max_ttl());
    let backend = Arc::new(Backend::new(storage, factory, lease_defaults));

    start_api_server(config.server.clone(), backend).await?;

    info!("vSphere secrets backend stopped");
    Ok(())
}

/// Simulator seeded with the `GOVMOMI_*` mount account, when one is set.
fn simulator_from_env() -> SimulatorProvider {
    let overrides = EnvOverrides::from_env();
    match (overrides.username, overrides.password) {
        (Some(username), Some(password)) => {
            SimulatorProvider::new().with_account(&username, password.expose_secret())
        }
        _ => SimulatorProvider::new(),
    }
}
