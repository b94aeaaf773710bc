use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{backend::Backend, config::ServerConfig, errors::Error};

use super::routes::build_router;

/// Serve the API until Ctrl-C.
pub async fn start_api_server(config: ServerConfig, backend: Arc<Backend>) -> crate::Result<()> {
    start_api_server_with_shutdown(config, backend, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "API server shutdown listener failed");
        }
    })
    .await
}

pub async fn start_api_server_with_shutdown<F>(
    config: ServerConfig,
    backend: Arc<Backend>,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");
    axum::serve(listener, build_router(backend))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::transport(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeaseDefaults;
    use crate::provider::{SimulatorFactory, SimulatorProvider};
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let backend = Arc::new(Backend::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(SimulatorFactory::new(Arc::new(SimulatorProvider::new()))),
            LeaseDefaults::default(),
        ));
        let config = ServerConfig { host: "not an address".into(), port: 8200 };

        let err = start_api_server_with_shutdown(config, backend, async {}).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
