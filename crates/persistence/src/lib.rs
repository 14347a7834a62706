//! Concrete `DurableStore` (ScyllaDB) and `CacheStore` (Redis)
//! implementations for the agent query orchestration core.

pub mod cache;
pub mod client;
pub mod durable;
pub mod error;
pub mod schema;

pub use cache::RedisCacheStore;
pub use client::{ScyllaClient, ScyllaConfig};
pub use durable::ScyllaDurableStore;
pub use error::PersistenceError;

/// Aggregate construction point for both stores, wired once at process
/// start and handed to `AppState`.
pub struct PersistenceLayer {
    pub durable: ScyllaDurableStore,
    pub cache: RedisCacheStore,
}

impl PersistenceLayer {
    pub async fn init(
        scylla_config: &ScyllaConfig,
        redis_url: &str,
    ) -> Result<Self, PersistenceError> {
        let scylla_client = ScyllaClient::connect(scylla_config)
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;
        scylla_client
            .ensure_schema()
            .await
            .map_err(|e| PersistenceError::DurableQuery(e.to_string()))?;

        let durable = ScyllaDurableStore::new(scylla_client.session, scylla_client.keyspace);
        let cache = RedisCacheStore::connect(redis_url).await?;

        Ok(Self { durable, cache })
    }
}
