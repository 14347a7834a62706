use agentcore_core::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum MemoryAdapterError {
    #[error("memory service request failed: {0}")]
    Transport(String),

    #[error("memory service request timed out")]
    Timeout,

    #[error("memory service returned malformed response: {0}")]
    Malformed(String),

    #[error("memory record not owned by caller")]
    NotOwned,
}

impl From<MemoryAdapterError> for CoreError {
    fn from(err: MemoryAdapterError) -> Self {
        match err {
            MemoryAdapterError::Transport(msg) => {
                tracing::error!(error = %msg, "memory service transport failure");
                CoreError::unavailable("memory service unavailable")
            }
            MemoryAdapterError::Timeout => {
                tracing::debug!("memory service call timed out");
                CoreError::unavailable("memory service timed out")
            }
            MemoryAdapterError::Malformed(msg) => {
                tracing::error!(error = %msg, "memory service returned malformed response");
                CoreError::new(ErrorKind::Internal, "memory service returned malformed response")
            }
            MemoryAdapterError::NotOwned => CoreError::not_found("memory record not found"),
        }
    }
}
