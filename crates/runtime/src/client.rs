//! `HttpAgentRuntime` — binds to the opaque downstream agent SDK over HTTP,
//! speaking a newline-delimited `data: <json>` event stream shaped like the
//! orchestrator's own SSE wire format.

use crate::error::RuntimeAdapterError;
use agentcore_core::{AgentRuntime, QueryOptions, RuntimeEvent};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AGENT_RUNTIME_URL").unwrap_or_default(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

pub struct HttpAgentRuntime {
    client: reqwest::Client,
    config: RuntimeConfig,
}

impl HttpAgentRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builder with static config never fails");
        Self { client, config }
    }
}

/// Wire shape of one event on the runtime's stream, mirroring
/// `agentcore-orchestrator::OrchestratorEvent`'s tagging so a runtime
/// implementation can reuse the same event vocabulary end to end.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireEvent {
    Init { session_id: Uuid },
    Message { content: serde_json::Value },
    ToolUse { raw: serde_json::Value },
    ToolResult { raw: serde_json::Value },
    Result { total_turns: u32, total_cost_micros: u64 },
    Error { message: String },
    Done,
}

impl From<WireEvent> for RuntimeEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Init { session_id } => RuntimeEvent::Init {
                session_id,
                raw: serde_json::Value::Null,
            },
            WireEvent::Message { content } => RuntimeEvent::Message { content },
            WireEvent::ToolUse { raw } => RuntimeEvent::ToolUse { raw },
            WireEvent::ToolResult { raw } => RuntimeEvent::ToolResult { raw },
            WireEvent::Result { total_turns, total_cost_micros } => RuntimeEvent::Result {
                total_turns,
                total_cost_micros,
                raw: serde_json::Value::Null,
            },
            WireEvent::Error { message } => RuntimeEvent::Error {
                message,
                raw: serde_json::Value::Null,
            },
            WireEvent::Done => RuntimeEvent::Done,
        }
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(
        &self,
        prompt: &str,
        session_id: Option<Uuid>,
        system_prompt_suffix: Option<&str>,
        options: &QueryOptions,
    ) -> agentcore_core::Result<Pin<Box<dyn futures::Stream<Item = RuntimeEvent> + Send>>> {
        if self.config.base_url.is_empty() {
            return Err(RuntimeAdapterError::Disabled.into());
        }

        let body = serde_json::json!({
            "prompt": prompt,
            "session_id": session_id,
            "system_prompt_suffix": system_prompt_suffix,
            "options": {
                "memory_enabled": options.memory_enabled,
                "memory_extraction_enabled": options.memory_extraction_enabled,
                "enable_graph": options.enable_graph,
                "memory_search_k": options.memory_search_k,
                "extra": options.extra,
            },
        });

        let response = self
            .client
            .post(format!("{}/v1/invoke", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeAdapterError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RuntimeAdapterError::Transport(format!(
                "unexpected status {}",
                response.status()
            ))
            .into());
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::error!(error = %err, "agent runtime stream read failed");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(json) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    match serde_json::from_str::<WireEvent>(json) {
                        Ok(wire) => {
                            let done = matches!(wire, WireEvent::Done);
                            if tx.send(RuntimeEvent::from(wire)).await.is_err() {
                                return;
                            }
                            if done {
                                return;
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, line = %json, "malformed agent runtime event");
                            let _ = tx
                                .send(RuntimeEvent::Error {
                                    message: "malformed agent runtime event".to_string(),
                                    raw: serde_json::Value::Null,
                                })
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}
