//! Stand-in used when no agent runtime binding is configured. Every
//! invocation surfaces `RUNTIME_UNAVAILABLE` rather than degrading to a
//! mock response (§7, scenario "runtime missing").

use crate::error::RuntimeAdapterError;
use agentcore_core::{AgentRuntime, QueryOptions, RuntimeEvent};
use async_trait::async_trait;
use std::pin::Pin;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAgentRuntime;

#[async_trait]
impl AgentRuntime for DisabledAgentRuntime {
    async fn invoke(
        &self,
        _prompt: &str,
        _session_id: Option<Uuid>,
        _system_prompt_suffix: Option<&str>,
        _options: &QueryOptions,
    ) -> agentcore_core::Result<Pin<Box<dyn futures::Stream<Item = RuntimeEvent> + Send>>> {
        Err(RuntimeAdapterError::Disabled.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_always_surfaces_runtime_unavailable() {
        let runtime = DisabledAgentRuntime;
        let err = runtime
            .invoke("hi", None, None, &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, agentcore_core::ErrorKind::RuntimeUnavailable);
    }
}
