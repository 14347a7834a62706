use agentcore_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeAdapterError {
    #[error("agent runtime request failed: {0}")]
    Transport(String),

    #[error("agent runtime returned malformed event: {0}")]
    Malformed(String),

    #[error("agent runtime binding is disabled")]
    Disabled,
}

impl From<RuntimeAdapterError> for CoreError {
    fn from(err: RuntimeAdapterError) -> Self {
        match err {
            RuntimeAdapterError::Transport(msg) => {
                tracing::error!(error = %msg, "agent runtime transport failure");
                CoreError::runtime_unavailable("agent runtime unavailable")
            }
            RuntimeAdapterError::Malformed(msg) => {
                tracing::error!(error = %msg, "agent runtime returned malformed event");
                CoreError::runtime_unavailable("agent runtime returned a malformed event")
            }
            RuntimeAdapterError::Disabled => {
                CoreError::runtime_unavailable("agent runtime binding is disabled")
            }
        }
    }
}
