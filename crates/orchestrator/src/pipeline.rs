//! The Query Orchestrator pipeline (§4.4): single and streaming modes share
//! this implementation end to end.

use crate::events::OrchestratorEvent;
use agentcore_core::{
    AgentRuntime, CoreError, ErrorKind, Fingerprint, MemoryHit, MemoryService, MemoryTurn,
    NewSession, QueryOptions, RuntimeEvent, SessionMode, TranscriptEntry, TranscriptRole,
};
use agentcore_sessions::SessionManager;
use chrono::Utc;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Depth of the channel coupling the runtime-consuming producer task to the
/// caller's response writer (§4.4.2).
pub const EVENT_CHANNEL_DEPTH: usize = 256;

const MEMORY_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const MEMORY_UNAVAILABLE_NOTE: &str = "Note: memory context is currently unavailable.";

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub prompt: String,
    pub session_id: Option<Uuid>,
    pub caller_key: Vec<u8>,
    pub options: QueryOptions,
}

#[derive(Debug, Clone)]
pub struct SingleQueryOutcome {
    pub session_id: Uuid,
    pub content: serde_json::Value,
    pub total_turns: u32,
    pub total_cost_micros: u64,
    /// Set when memory extraction failed post-completion; surfaced in the
    /// response envelope rather than dropped silently (§4.4.1 step 7).
    pub extraction_error: Option<CoreError>,
}

/// Cooperative cancellation signal shared between the producer task and the
/// caller's response writer (§5).
#[derive(Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    memory: Arc<dyn MemoryService>,
    runtime: Arc<dyn AgentRuntime>,
}

/// Accumulates runtime progress shared by both pipeline modes: the
/// runtime-assigned session id (once seen), running turn/cost totals, and
/// the transcript entries collected so best-effort persistence can proceed
/// even after cancellation.
struct PipelineState {
    session_id: Option<Uuid>,
    total_turns: u32,
    total_cost_micros: u64,
    transcript: Vec<TranscriptEntry>,
    reached_result: bool,
}

impl PipelineState {
    fn new(existing_session_id: Option<Uuid>) -> Self {
        Self {
            session_id: existing_session_id,
            total_turns: 0,
            total_cost_micros: 0,
            transcript: Vec::new(),
            reached_result: false,
        }
    }
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        memory: Arc<dyn MemoryService>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        Self { sessions, memory, runtime }
    }

    /// Step 1: fingerprint the caller's key exactly once per request.
    fn authenticate(caller_key: &[u8]) -> Fingerprint {
        agentcore_hashing::fingerprint(caller_key)
    }

    /// Step 2: resolve an existing session under ownership enforcement, or
    /// defer to the runtime's first `init` event.
    async fn resolve_session(
        &self,
        session_id: Option<Uuid>,
        caller_fp: Fingerprint,
    ) -> agentcore_core::Result<Option<Uuid>> {
        match session_id {
            Some(id) => {
                let session = self.sessions.get(id, caller_fp).await?;
                Ok(Some(session.id))
            }
            None => Ok(None),
        }
    }

    /// Step 3: best-effort memory injection with a bounded timeout.
    async fn inject_memory(
        &self,
        caller_fp: Fingerprint,
        prompt: &str,
        options: &QueryOptions,
    ) -> Option<String> {
        if !options.memory_enabled || prompt.is_empty() {
            return None;
        }

        let search = self.memory.search(caller_fp, prompt, options.memory_search_k, options.enable_graph);
        match tokio::time::timeout(MEMORY_SEARCH_TIMEOUT, search).await {
            Ok(Ok(hits)) => Self::format_memory_suffix(&hits),
            Ok(Err(err)) if err.kind == ErrorKind::Unavailable => {
                tracing::debug!(caller_fp = %caller_fp, "memory search unavailable, proceeding without injection");
                Some(MEMORY_UNAVAILABLE_NOTE.to_string())
            }
            Ok(Err(err)) => {
                tracing::error!(caller_fp = %caller_fp, error_id = %err.error_id, "memory search failed");
                None
            }
            Err(_elapsed) => {
                tracing::debug!(caller_fp = %caller_fp, "memory search timed out, proceeding without injection");
                Some(MEMORY_UNAVAILABLE_NOTE.to_string())
            }
        }
    }

    /// Renders retrieved hits into the system-prompt suffix the runtime
    /// actually sees. `None` when the search came back empty — an empty
    /// suffix is not worth appending, and the runtime falls back to no
    /// memory context, same as "memory disabled."
    fn format_memory_suffix(hits: &[MemoryHit]) -> Option<String> {
        if hits.is_empty() {
            return None;
        }

        let mut suffix = String::from("Relevant memory context:\n");
        for hit in hits {
            suffix.push_str(&format!("- {}\n", hit.content));
        }
        Some(suffix)
    }

    /// Single-mode pipeline: runs steps 1-8 and returns one buffered
    /// response (§4.4, mode "single").
    pub async fn run_single(&self, request: QueryRequest) -> agentcore_core::Result<SingleQueryOutcome> {
        let caller_fp = Self::authenticate(&request.caller_key);
        let resolved_id = self.resolve_session(request.session_id, caller_fp).await?;
        let memory_note = self.inject_memory(caller_fp, &request.prompt, &request.options).await;

        let mut stream = self
            .runtime
            .invoke(&request.prompt, resolved_id, memory_note.as_deref(), &request.options)
            .await?;

        let mut state = PipelineState::new(resolved_id);
        let mut content = serde_json::Value::Null;
        let mut seq = 0u32;

        state.transcript.push(TranscriptEntry {
            session_id: resolved_id.unwrap_or_else(Uuid::nil),
            seq,
            role: TranscriptRole::User,
            content: serde_json::Value::String(request.prompt.clone()),
            created_at: Utc::now(),
        });
        seq += 1;

        while let Some(event) = stream.next().await {
            match event {
                RuntimeEvent::Init { session_id, .. } => {
                    state.session_id = Some(session_id);
                    for entry in state.transcript.iter_mut() {
                        entry.session_id = session_id;
                    }
                }
                RuntimeEvent::Message { content: c } => {
                    content = c.clone();
                    state.transcript.push(TranscriptEntry {
                        session_id: state.session_id.unwrap_or_else(Uuid::nil),
                        seq,
                        role: TranscriptRole::Assistant,
                        content: c,
                        created_at: Utc::now(),
                    });
                    seq += 1;
                }
                RuntimeEvent::ToolUse { .. } | RuntimeEvent::ToolResult { .. } => {}
                RuntimeEvent::Result { total_turns, total_cost_micros, .. } => {
                    state.total_turns = total_turns;
                    state.total_cost_micros = total_cost_micros;
                    state.reached_result = true;
                }
                RuntimeEvent::Error { message, .. } => {
                    tracing::error!(error = %message, "runtime reported an error mid-stream");
                }
                RuntimeEvent::Done => break,
            }
        }

        if !state.reached_result {
            return Err(CoreError::runtime_unavailable("agent runtime ended without a result"));
        }

        let extraction_error = persist_and_extract(
            &self.sessions,
            &*self.memory,
            &state,
            caller_fp,
            &request.options_model(),
            request.options.memory_extraction_enabled,
        )
        .await?;

        Ok(SingleQueryOutcome {
            session_id: state.session_id.ok_or_else(|| {
                CoreError::runtime_unavailable("agent runtime never assigned a session id")
            })?,
            content,
            total_turns: state.total_turns,
            total_cost_micros: state.total_cost_micros,
            extraction_error,
        })
    }

    /// Streaming-mode pipeline: runs the producer/consumer split over a
    /// bounded channel and returns the receiver half for the HTTP layer to
    /// drain into an SSE response.
    pub async fn run_stream(
        &self,
        request: QueryRequest,
        cancellation: CancellationSignal,
    ) -> agentcore_core::Result<mpsc::Receiver<OrchestratorEvent>> {
        let caller_fp = Self::authenticate(&request.caller_key);
        let resolved_id = self.resolve_session(request.session_id, caller_fp).await?;
        let memory_note = self.inject_memory(caller_fp, &request.prompt, &request.options).await;

        let mut stream = self
            .runtime
            .invoke(&request.prompt, resolved_id, memory_note.as_deref(), &request.options)
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let sessions = Arc::clone(&self.sessions);
        let memory = Arc::clone(&self.memory);
        let model = request.options_model();
        let extraction_enabled = request.options.memory_extraction_enabled;
        let prompt = request.prompt.clone();

        tokio::spawn(async move {
            let mut state = PipelineState::new(resolved_id);
            let mut seq = 0u32;
            state.transcript.push(TranscriptEntry {
                session_id: resolved_id.unwrap_or_else(Uuid::nil),
                seq,
                role: TranscriptRole::User,
                content: serde_json::Value::String(prompt),
                created_at: Utc::now(),
            });
            seq += 1;

            let mut cancelled = false;

            loop {
                if cancellation.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let event = tokio::select! {
                    biased;
                    _ = tx.closed() => { cancelled = true; None }
                    next = stream.next() => next,
                };

                let Some(event) = event else { break };
                if cancellation.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let forwarded = match event {
                    RuntimeEvent::Init { session_id, .. } => {
                        state.session_id = Some(session_id);
                        for entry in state.transcript.iter_mut() {
                            entry.session_id = session_id;
                        }
                        Some(OrchestratorEvent::Init { session_id })
                    }
                    RuntimeEvent::Message { content } => {
                        state.transcript.push(TranscriptEntry {
                            session_id: state.session_id.unwrap_or_else(Uuid::nil),
                            seq,
                            role: TranscriptRole::Assistant,
                            content: content.clone(),
                            created_at: Utc::now(),
                        });
                        seq += 1;
                        Some(OrchestratorEvent::Message { content })
                    }
                    RuntimeEvent::ToolUse { raw } => Some(OrchestratorEvent::ToolUse { raw }),
                    RuntimeEvent::ToolResult { raw } => Some(OrchestratorEvent::ToolResult { raw }),
                    RuntimeEvent::Result { total_turns, total_cost_micros, .. } => {
                        state.total_turns = total_turns;
                        state.total_cost_micros = total_cost_micros;
                        state.reached_result = true;
                        Some(OrchestratorEvent::Result { total_turns, total_cost_micros })
                    }
                    RuntimeEvent::Error { message, .. } => Some(OrchestratorEvent::Error {
                        code: ErrorKind::Internal.to_string(),
                        message,
                        error_id: String::new(),
                    }),
                    RuntimeEvent::Done => break,
                };

                if let Some(event) = forwarded {
                    if tx.send(event).await.is_err() {
                        cancelled = true;
                        break;
                    }
                }
            }

            // Cleanup (step 8): persistence is attempted even when
            // cancelled (best-effort, bounded), extraction is not (§5).
            let extraction_enabled = extraction_enabled && !cancelled;
            let persist = persist_and_extract(&sessions, &*memory, &state, caller_fp, &model, extraction_enabled);

            match tokio::time::timeout(Duration::from_secs(5), persist).await {
                Ok(Ok(Some(extraction_err))) => {
                    let _ = tx
                        .send(OrchestratorEvent::Error {
                            code: extraction_err.kind.to_string(),
                            message: extraction_err.message,
                            error_id: extraction_err.error_id,
                        })
                        .await;
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    tracing::error!(error_id = %err.error_id, "post-stream persistence failed");
                }
                Err(_) => {
                    tracing::error!("post-stream persistence timed out");
                }
            }

            let _ = tx.send(OrchestratorEvent::Done).await;
        });

        Ok(rx)
    }
}

impl QueryRequest {
    fn options_model(&self) -> String {
        self.options
            .extra
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string()
    }
}

/// Steps 6-7: idempotent session upsert plus (optional) memory extraction,
/// run after a successful — or best-effort cancelled — stream. Returns the
/// extraction error, if any, for the caller to surface rather than drop.
/// Free function (not a method) so the streaming task's spawned future
/// doesn't need a whole `Orchestrator` — just the two collaborators this
/// step actually touches.
async fn persist_and_extract(
    sessions: &SessionManager,
    memory: &dyn MemoryService,
    state: &PipelineState,
    caller_fp: Fingerprint,
    model: &str,
    extraction_enabled: bool,
) -> agentcore_core::Result<Option<CoreError>> {
    let session_id = match state.session_id {
        Some(id) => id,
        // No runtime-assigned id was ever observed; nothing to persist.
        None => return Ok(None),
    };

    match sessions.get(session_id, caller_fp).await {
        Ok(_) => {
            sessions
                .record_turn(session_id, caller_fp, state.total_turns, state.total_cost_micros)
                .await?;
        }
        Err(err) if err.kind == ErrorKind::NotFound => {
            sessions
                .create_with_id(
                    session_id,
                    NewSession {
                        mode: SessionMode::Code,
                        model: model.to_string(),
                        parent_id: None,
                        title: None,
                        metadata: Default::default(),
                    },
                    caller_fp,
                )
                .await?;
            if state.total_turns > 0 {
                sessions
                    .record_turn(session_id, caller_fp, state.total_turns, state.total_cost_micros)
                    .await?;
            }
        }
        Err(err) => return Err(err),
    }

    for entry in &state.transcript {
        sessions.append_transcript(entry.clone()).await?;
    }

    if !extraction_enabled {
        return Ok(None);
    }

    let turns: Vec<MemoryTurn> = state
        .transcript
        .iter()
        .map(|e| MemoryTurn { role: e.role, content: e.content.clone() })
        .collect();
    if turns.is_empty() {
        return Ok(None);
    }

    match memory.add(caller_fp, &turns).await {
        Ok(()) => Ok(None),
        Err(err) => {
            tracing::error!(session_id = %session_id, error_id = %err.error_id, "memory extraction failed");
            Ok(Some(CoreError::memory_extraction_failed("memory extraction failed")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_core::{CacheStore, DeploymentMode, DurableStore, Fingerprint, ListFilters,
        MemoryHit, Pagination, Session};
    use agentcore_sessions::LockManager;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDurable {
        sessions: Mutex<HashMap<Uuid, Session>>,
        transcripts: Mutex<Vec<TranscriptEntry>>,
    }

    #[async_trait]
    impl DurableStore for FakeDurable {
        async fn create_session(&self, session: &Session) -> agentcore_core::Result<()> {
            self.sessions.lock().insert(session.id, session.clone());
            Ok(())
        }
        async fn get_session(&self, id: Uuid) -> agentcore_core::Result<Option<Session>> {
            Ok(self.sessions.lock().get(&id).cloned())
        }
        async fn update_session(&self, updated: &Session) -> agentcore_core::Result<()> {
            self.sessions.lock().insert(updated.id, updated.clone());
            Ok(())
        }
        async fn delete_session(&self, id: Uuid) -> agentcore_core::Result<()> {
            self.sessions.lock().remove(&id);
            Ok(())
        }
        async fn append_transcript_entry(&self, entry: &TranscriptEntry) -> agentcore_core::Result<()> {
            self.transcripts.lock().push(entry.clone());
            Ok(())
        }
        async fn list_transcript(&self, session_id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> {
            Ok(self.transcripts.lock().iter().filter(|e| e.session_id == session_id).cloned().collect())
        }
        async fn list_by_owner(
            &self,
            _owner_fp: Fingerprint,
            _filters: &ListFilters,
            _pagination: Pagination,
        ) -> agentcore_core::Result<(Vec<Session>, u64)> {
            Ok((Vec::new(), 0))
        }
    }

    #[derive(Default)]
    struct FakeCache {
        blobs: Mutex<HashMap<Uuid, Vec<u8>>>,
        locks: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CacheStore for FakeCache {
        async fn get_session(&self, id: Uuid) -> agentcore_core::Result<Option<Vec<u8>>> {
            Ok(self.blobs.lock().get(&id).cloned())
        }
        async fn put_session(&self, id: Uuid, payload: &[u8], _ttl: Duration) -> agentcore_core::Result<()> {
            self.blobs.lock().insert(id, payload.to_vec());
            Ok(())
        }
        async fn delete_session(&self, id: Uuid) -> agentcore_core::Result<()> {
            self.blobs.lock().remove(&id);
            Ok(())
        }
        async fn add_to_owner_index(&self, _owner_fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn remove_from_owner_index(&self, _owner_fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> agentcore_core::Result<bool> {
            let mut locks = self.locks.lock();
            if locks.contains_key(key) {
                Ok(false)
            } else {
                locks.insert(key.to_string(), value.to_string());
                Ok(true)
            }
        }
        async fn delete_if_equal(&self, key: &str, expected_value: &str) -> agentcore_core::Result<bool> {
            let mut locks = self.locks.lock();
            if locks.get(key).map(String::as_str) == Some(expected_value) {
                locks.remove(key);
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    #[derive(Default)]
    struct FakeMemory {
        added: Mutex<Vec<(Fingerprint, usize)>>,
        fail_add: bool,
    }

    #[async_trait]
    impl MemoryService for FakeMemory {
        async fn add(&self, user_fp: Fingerprint, turns: &[MemoryTurn]) -> agentcore_core::Result<()> {
            if self.fail_add {
                return Err(CoreError::internal("memory add failed"));
            }
            self.added.lock().push((user_fp, turns.len()));
            Ok(())
        }
        async fn search(
            &self,
            _user_fp: Fingerprint,
            _query: &str,
            _k: u32,
            _enable_graph: bool,
        ) -> agentcore_core::Result<Vec<MemoryHit>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _user_fp: Fingerprint, _id: &str) -> agentcore_core::Result<()> {
            Ok(())
        }
    }

    /// Replays a fixed sequence of events, ignoring all input parameters.
    struct ScriptedRuntime {
        events: Vec<RuntimeEvent>,
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn invoke(
            &self,
            _prompt: &str,
            _session_id: Option<Uuid>,
            _system_prompt_suffix: Option<&str>,
            _options: &QueryOptions,
        ) -> agentcore_core::Result<std::pin::Pin<Box<dyn futures::Stream<Item = RuntimeEvent> + Send>>> {
            let events = self.events.clone();
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct RuntimeUnavailable;

    #[async_trait]
    impl AgentRuntime for RuntimeUnavailable {
        async fn invoke(
            &self,
            _prompt: &str,
            _session_id: Option<Uuid>,
            _system_prompt_suffix: Option<&str>,
            _options: &QueryOptions,
        ) -> agentcore_core::Result<std::pin::Pin<Box<dyn futures::Stream<Item = RuntimeEvent> + Send>>> {
            Err(CoreError::runtime_unavailable("agent runtime binding disabled"))
        }
    }

    fn test_sessions() -> Arc<SessionManager> {
        let durable = Arc::new(FakeDurable::default());
        let cache = Arc::new(FakeCache::default());
        let locks = LockManager::new(cache.clone(), DeploymentMode::SingleInstance);
        Arc::new(SessionManager::new(durable, cache, locks))
    }

    fn fp() -> Fingerprint {
        agentcore_hashing::fingerprint(b"test-caller-key")
    }

    fn happy_path_runtime(session_id: Uuid) -> Arc<dyn AgentRuntime> {
        Arc::new(ScriptedRuntime {
            events: vec![
                RuntimeEvent::Init { session_id, raw: serde_json::json!({}) },
                RuntimeEvent::Message { content: serde_json::json!("hi") },
                RuntimeEvent::Result { total_turns: 1, total_cost_micros: 100, raw: serde_json::json!({}) },
                RuntimeEvent::Done,
            ],
        })
    }

    fn base_request() -> QueryRequest {
        QueryRequest {
            prompt: "hello".to_string(),
            session_id: None,
            caller_key: b"test-caller-key".to_vec(),
            options: QueryOptions::default(),
        }
    }

    #[tokio::test]
    async fn happy_path_single_mode_persists_and_extracts() {
        let session_id = Uuid::new_v4();
        let sessions = test_sessions();
        let memory = Arc::new(FakeMemory::default());
        let orchestrator = Orchestrator::new(sessions.clone(), memory.clone(), happy_path_runtime(session_id));

        let mut request = base_request();
        request.options.memory_extraction_enabled = true;

        let outcome = orchestrator.run_single(request).await.unwrap();
        assert_eq!(outcome.session_id, session_id);
        assert_eq!(outcome.total_turns, 1);
        assert!(outcome.extraction_error.is_none());

        let stored = sessions.get(session_id, fp()).await.unwrap();
        assert_eq!(stored.total_turns, 1);
        assert_eq!(memory.added.lock().len(), 1);
    }

    #[tokio::test]
    async fn runtime_missing_surfaces_runtime_unavailable() {
        let sessions = test_sessions();
        let memory = Arc::new(FakeMemory::default());
        let orchestrator = Orchestrator::new(sessions, memory, Arc::new(RuntimeUnavailable));

        let result = orchestrator.run_single(base_request()).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::RuntimeUnavailable);
    }

    #[tokio::test]
    async fn memory_extraction_failure_is_surfaced_not_dropped() {
        let session_id = Uuid::new_v4();
        let sessions = test_sessions();
        let memory = Arc::new(FakeMemory { fail_add: true, ..Default::default() });
        let orchestrator = Orchestrator::new(sessions, memory, happy_path_runtime(session_id));

        let mut request = base_request();
        request.options.memory_extraction_enabled = true;

        let outcome = orchestrator.run_single(request).await.unwrap();
        assert!(outcome.extraction_error.is_some());
        assert_eq!(outcome.extraction_error.unwrap().kind, ErrorKind::MemoryExtractionFailed);
    }

    #[tokio::test]
    async fn streaming_cancellation_suppresses_extraction() {
        let session_id = Uuid::new_v4();
        let sessions = test_sessions();
        let memory = Arc::new(FakeMemory::default());
        let orchestrator = Orchestrator::new(sessions.clone(), memory.clone(), happy_path_runtime(session_id));

        let mut request = base_request();
        request.options.memory_extraction_enabled = true;
        let cancellation = CancellationSignal::new();

        let mut rx = orchestrator.run_stream(request, cancellation.clone()).await.unwrap();
        // Let the producer observe at least one event before cancelling.
        let _ = rx.recv().await;
        cancellation.cancel();

        while rx.recv().await.is_some() {}

        assert!(memory.added.lock().is_empty());
    }
}
