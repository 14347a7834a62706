//! ScyllaDB connection management.

use scylla::{Session as ScyllaSession, SessionBuilder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub connect_timeout: Duration,
}

impl ScyllaConfig {
    /// Reads `SCYLLA_HOSTS` (comma-separated) and `SCYLLA_KEYSPACE`, falling
    /// back to single-node development defaults.
    pub fn from_env() -> Self {
        let hosts = std::env::var("SCYLLA_HOSTS")
            .unwrap_or_else(|_| "127.0.0.1:9042".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        let keyspace = std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "agentcore".to_string());
        Self {
            hosts,
            keyspace,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ScyllaClient {
    pub session: Arc<ScyllaSession>,
    pub keyspace: String,
}

impl ScyllaClient {
    pub async fn connect(config: &ScyllaConfig) -> Result<Self, scylla::transport::errors::NewSessionError> {
        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .connection_timeout(config.connect_timeout)
            .build()
            .await?;
        Ok(Self {
            session: Arc::new(session),
            keyspace: config.keyspace.clone(),
        })
    }

    pub async fn ensure_schema(&self) -> Result<(), scylla::transport::errors::QueryError> {
        crate::schema::ensure_schema(&self.session, &self.keyspace).await
    }
}
