//! Per-crate error type; bridged to `agentcore_core::CoreError` at the
//! boundary so no raw driver message ever reaches a response body (§7).

use agentcore_core::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("durable store connection failure: {0}")]
    DurableConnection(String),

    #[error("durable store query failure: {0}")]
    DurableQuery(String),

    #[error("cache store connection failure: {0}")]
    CacheConnection(String),

    #[error("row failed to deserialize: {0}")]
    Deserialize(String),

    #[error("duplicate primary key")]
    AlreadyExists,
}

impl From<PersistenceError> for CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::DurableConnection(msg) => {
                tracing::error!(error = %msg, "durable store unreachable");
                CoreError::unavailable("durable store unavailable")
            }
            PersistenceError::CacheConnection(msg) => {
                tracing::error!(error = %msg, "cache store unreachable");
                CoreError::unavailable("cache store unavailable")
            }
            PersistenceError::AlreadyExists => CoreError::already_exists("session already exists"),
            PersistenceError::DurableQuery(msg) => {
                tracing::error!(error = %msg, "durable store query failed");
                CoreError::new(ErrorKind::Internal, "durable store query failed")
            }
            PersistenceError::Deserialize(msg) => {
                tracing::error!(error = %msg, "row deserialization failed");
                CoreError::new(ErrorKind::Internal, "row deserialization failed")
            }
        }
    }
}
