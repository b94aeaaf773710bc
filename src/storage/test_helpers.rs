//! PostgreSQL test database for storage tests.
//!
//! Each [`TestDatabase`] starts a fresh PostgreSQL container through
//! Testcontainers and connects a [`PgStorage`] to it with the schema created.

use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

use crate::config::StorageConfig;
use crate::storage::PgStorage;

/// Storage backed by a throwaway container. Keep it alive for the whole test.
pub struct TestDatabase {
    pub storage: PgStorage,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    pub async fn new(prefix: &str) -> Self {
        let container = Postgres::default().start().await.unwrap_or_else(|e| {
            panic!("Failed to start PostgreSQL container for {}: {}", prefix, e)
        });

        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        let config = StorageConfig {
            database_url: Some(url.clone()),
            max_connections: 5,
            ..Default::default()
        };

        let storage = PgStorage::connect(&config, &url)
            .await
            .unwrap_or_else(|e| panic!("Failed to connect test storage for {}: {}", prefix, e));

        Self { storage, _container: container }
    }
}
