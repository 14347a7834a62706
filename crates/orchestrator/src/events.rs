//! Wire-shaped orchestrator events (§4.4.2, §6.2).

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Init { session_id: Uuid },
    Message { content: Value },
    ToolUse { raw: Value },
    ToolResult { raw: Value },
    Result { total_turns: u32, total_cost_micros: u64 },
    Error { code: String, message: String, error_id: String },
    Done,
}

impl OrchestratorEvent {
    /// `event: <kind>\n` name used on the SSE wire; matches the `kind` tag.
    pub fn sse_kind(&self) -> &'static str {
        match self {
            OrchestratorEvent::Init { .. } => "init",
            OrchestratorEvent::Message { .. } => "message",
            OrchestratorEvent::ToolUse { .. } => "tool_use",
            OrchestratorEvent::ToolResult { .. } => "tool_result",
            OrchestratorEvent::Result { .. } => "result",
            OrchestratorEvent::Error { .. } => "error",
            OrchestratorEvent::Done => "done",
        }
    }
}
