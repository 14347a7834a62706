//! `AgentRuntime` trait seam — stands in for the opaque downstream agent SDK
//! (§2, §4.4.1 step 4).

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Caller-supplied knobs for one query, threaded through unchanged from the
/// HTTP boundary to the runtime invocation.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub memory_enabled: bool,
    pub memory_extraction_enabled: bool,
    pub enable_graph: bool,
    pub memory_search_k: u32,
    /// Extra, opaque runtime-specific parameters. All runner implementations
    /// accept the full parameter set with `null` defaults — no parameter
    /// introspection branch.
    pub extra: Value,
}

/// One event surfaced by the agent runtime's stream (§4.4.2). Only `Init`,
/// `Message`, `Result`, `Error`, `Done` affect orchestrator state; `ToolUse`
/// and `ToolResult` are transparent pass-through.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// First event of a stream; carries the runtime-assigned session id.
    Init { session_id: Uuid, raw: Value },
    Message { content: Value },
    ToolUse { raw: Value },
    ToolResult { raw: Value },
    Result { total_turns: u32, total_cost_micros: u64, raw: Value },
    Error { message: String, raw: Value },
    Done,
}

/// The opaque downstream agent SDK. A missing or broken binding MUST
/// surface as `RUNTIME_UNAVAILABLE`, never be papered over with a mock.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Opens an async event stream for one query. The returned stream is the
    /// sole source of the authoritative `session_id` for new sessions.
    async fn invoke(
        &self,
        prompt: &str,
        session_id: Option<Uuid>,
        system_prompt_suffix: Option<&str>,
        options: &QueryOptions,
    ) -> crate::error::Result<
        std::pin::Pin<Box<dyn futures::Stream<Item = RuntimeEvent> + Send>>,
    >;
}
