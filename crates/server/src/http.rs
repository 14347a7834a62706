//! HTTP surface: session CRUD, the two query entry points, and the
//! ambient health/readiness/metrics/admin routes (§6.1).

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tower::timeout::error::Elapsed;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use agentcore_core::{
    CoreError, ErrorKind, ListFilters, Pagination, QueryOptions, SessionMode, StatusFilter,
};
use agentcore_orchestrator::{CancellationSignal, OrchestratorEvent, QueryRequest};

use crate::auth::{auth_middleware, CallerKey};
use crate::error_response::ApiError;
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    // Dropping the response body on timeout is what triggers `CancelOnDrop`
    // for in-flight streams (§5, cancellation trigger (b)).
    let request_timeout = Duration::from_secs(config.server.timeout_seconds);
    drop(config);

    Router::new()
        .route("/api/v1/query/single", post(query_single))
        .route("/api/v1/query/stream", post(query_stream))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/:id", get(get_session))
        .route("/api/v1/sessions/:id", delete(delete_session))
        .route("/api/v1/sessions/:id/tags", patch(update_tags))
        .route("/api/v1/sessions/:id/promote", post(promote_session))
        .route("/api/v1/sessions/:id/fork", post(fork_session))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/admin/reload-config", post(reload_config))
        .layer(axum::middleware::from_fn(auth_middleware))
        .layer(Extension(state.config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(axum::error_handling::HandleErrorLayer::new(handle_timeout_error))
                .timeout(request_timeout),
        )
        .layer(cors_layer)
        .with_state(state)
}

async fn handle_timeout_error(err: tower::BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError(CoreError::runtime_unavailable("request exceeded the configured timeout"))
    } else {
        ApiError(CoreError::new(ErrorKind::Internal, format!("unhandled middleware error: {err}")))
    }
}

/// Builds the CORS layer from configured origins; falls back to permissive
/// (dev only) or localhost when `cors_origins` is empty or unparsable.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .allow_credentials(true)
}

fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError(CoreError::validation("path parameter is not a valid UUID")))
}

#[derive(Debug, Deserialize)]
struct QueryOptionsBody {
    #[serde(default)]
    memory_enabled: bool,
    #[serde(default)]
    memory_extraction_enabled: bool,
    #[serde(default)]
    enable_graph: bool,
    #[serde(default = "default_memory_search_k")]
    memory_search_k: u32,
    #[serde(default)]
    extra: serde_json::Value,
}

fn default_memory_search_k() -> u32 {
    5
}

impl From<QueryOptionsBody> for QueryOptions {
    fn from(body: QueryOptionsBody) -> Self {
        QueryOptions {
            memory_enabled: body.memory_enabled,
            memory_extraction_enabled: body.memory_extraction_enabled,
            enable_graph: body.enable_graph,
            memory_search_k: body.memory_search_k,
            extra: body.extra,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequestBody {
    prompt: String,
    #[serde(default)]
    session_id: Option<Uuid>,
    #[serde(default)]
    options: QueryOptionsBody,
}

fn caller_key_or_missing(caller_key: Option<Extension<CallerKey>>) -> Result<Vec<u8>, ApiError> {
    caller_key
        .map(|Extension(CallerKey(key))| key)
        .ok_or_else(|| ApiError(CoreError::unauthenticated("missing X-API-Key header")))
}

#[derive(Serialize)]
struct SingleQueryResponse {
    session_id: Uuid,
    content: serde_json::Value,
    total_turns: u32,
    total_cost_micros: u64,
    extraction_error: Option<ExtractionErrorBody>,
}

#[derive(Serialize)]
struct ExtractionErrorBody {
    code: String,
    message: String,
}

async fn query_single(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Json(body): Json<QueryRequestBody>,
) -> Result<Json<SingleQueryResponse>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    if body.prompt.trim().is_empty() {
        return Err(ApiError(CoreError::validation("prompt must not be empty")));
    }

    let request = QueryRequest {
        prompt: body.prompt,
        session_id: body.session_id,
        caller_key,
        options: body.options.into(),
    };

    metrics::counter!("agentcore_requests_total", "route" => "query_single").increment(1);
    let outcome = state.orchestrator.run_single(request).await.inspect_err(|_| {
        metrics::counter!("agentcore_errors_total", "route" => "query_single").increment(1);
    })?;

    Ok(Json(SingleQueryResponse {
        session_id: outcome.session_id,
        content: outcome.content,
        total_turns: outcome.total_turns,
        total_cost_micros: outcome.total_cost_micros,
        extraction_error: outcome.extraction_error.map(|e| ExtractionErrorBody {
            code: e.kind.to_string(),
            message: e.message,
        }),
    }))
}

/// Wraps the orchestrator's event receiver so that either a client
/// disconnect (the SSE body future is dropped) or the global request
/// timeout (which drops the response body the same way) cancels the
/// in-flight stream. `ReceiverStream` is `Unpin`, so no pin projection is
/// needed here.
struct CancelOnDrop<S> {
    inner: S,
    cancellation: CancellationSignal,
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CancelOnDrop<S> {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn query_stream(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Json(body): Json<QueryRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    if body.prompt.trim().is_empty() {
        return Err(ApiError(CoreError::validation("prompt must not be empty")));
    }

    let request = QueryRequest {
        prompt: body.prompt,
        session_id: body.session_id,
        caller_key,
        options: body.options.into(),
    };

    let cancellation = CancellationSignal::new();

    metrics::counter!("agentcore_requests_total", "route" => "query_stream").increment(1);
    let receiver = state
        .orchestrator
        .run_stream(request, cancellation.clone())
        .await
        .inspect_err(|_| {
            metrics::counter!("agentcore_errors_total", "route" => "query_stream").increment(1);
        })?;

    let stream = CancelOnDrop { inner: ReceiverStream::new(receiver), cancellation };
    let events = futures::StreamExt::map(stream, |event| {
        let kind = event.sse_kind();
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "null".to_string());
        Ok::<_, std::convert::Infallible>(Event::default().event(kind).data(data))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize, Default)]
struct ListSessionsQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    mode: Option<String>,
    project_id: Option<String>,
    tag_contains: Option<String>,
    status: Option<String>,
    text_search: Option<String>,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<agentcore_core::Session>,
    total: u64,
    page: u32,
    page_size: u32,
}

async fn list_sessions(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);

    let pagination = Pagination::new(
        query.page.unwrap_or(Pagination::DEFAULT_PAGE),
        query.page_size.unwrap_or(Pagination::DEFAULT_PAGE_SIZE),
    )
    .map_err(ApiError)?;

    let mode = match query.mode.as_deref() {
        None => None,
        Some("brainstorm") => Some(SessionMode::Brainstorm),
        Some("code") => Some(SessionMode::Code),
        Some(other) => {
            return Err(ApiError(CoreError::validation(format!(
                "unknown mode filter '{other}'"
            ))))
        }
    };

    let status = match query.status.as_deref() {
        None => None,
        Some("active") => Some(StatusFilter::Active),
        Some("completed") => Some(StatusFilter::Completed),
        Some("error") => Some(StatusFilter::Error),
        Some(other) => {
            return Err(ApiError(CoreError::validation(format!(
                "unknown status filter '{other}'"
            ))))
        }
    };

    let filters = ListFilters {
        mode,
        project_id: query.project_id,
        tag_contains: query.tag_contains,
        status,
        text_search: query.text_search,
        metadata_predicate: None,
    };

    let (sessions, total) = state.sessions.list(caller_fp, filters, pagination).await?;

    Ok(Json(ListSessionsResponse {
        sessions,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Path(id): Path<String>,
) -> Result<Json<agentcore_core::Session>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let id = parse_uuid(&id)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);
    let session = state.sessions.get(id, caller_fp).await?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let id = parse_uuid(&id)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);
    state.sessions.delete(id, caller_fp).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UpdateTagsBody {
    tags: Vec<String>,
}

async fn update_tags(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTagsBody>,
) -> Result<Json<agentcore_core::Session>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let id = parse_uuid(&id)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);
    let session = state.sessions.update_tags(id, body.tags, caller_fp).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct PromoteBody {
    project_id: String,
}

async fn promote_session(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Path(id): Path<String>,
    Json(body): Json<PromoteBody>,
) -> Result<Json<agentcore_core::Session>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let id = parse_uuid(&id)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);
    let session = state.sessions.promote(id, body.project_id, caller_fp).await?;
    Ok(Json(session))
}

async fn fork_session(
    State(state): State<AppState>,
    caller_key: Option<Extension<CallerKey>>,
    Path(id): Path<String>,
) -> Result<Json<agentcore_core::Session>, ApiError> {
    let caller_key = caller_key_or_missing(caller_key)?;
    let id = parse_uuid(&id)?;
    let caller_fp = agentcore_hashing::fingerprint(&caller_key);
    let session = state.sessions.fork(id, caller_fp).await?;
    Ok(Json(session))
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Checks the one dependency health_check doesn't: the memory service, via
/// a short-timeout best-effort reachability probe. Config is extracted
/// before the await — `parking_lot` guards aren't `Send`.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let memory_base_url = {
        let config = state.get_config();
        config.memory_service.base_url.clone()
    };

    let mut checks = serde_json::Map::new();
    let mut ready = true;

    if memory_base_url.is_empty() {
        checks.insert(
            "memory_service".to_string(),
            serde_json::json!({"status": "disabled"}),
        );
    } else {
        let url = format!("{memory_base_url}/health");
        let status = match tokio::time::timeout(Duration::from_secs(2), reqwest::get(&url)).await {
            Ok(Ok(resp)) if resp.status().is_success() => "ok",
            Ok(Ok(_)) => {
                ready = false;
                "error"
            }
            Ok(Err(_)) => {
                ready = false;
                "unreachable"
            }
            Err(_) => {
                ready = false;
                "timeout"
            }
        };
        checks.insert("memory_service".to_string(), serde_json::json!({"status": status}));
    }

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "success"})),
        ),
        Err(e) => {
            tracing::error!(error = %e, "configuration reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_config::Settings;
    use agentcore_core::{AgentRuntime, CacheStore, DurableStore, Fingerprint, MemoryHit,
        MemoryService, MemoryTurn, RuntimeEvent, Session, TranscriptEntry};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopDurable;
    #[async_trait]
    impl DurableStore for NoopDurable {
        async fn create_session(&self, _s: &Session) -> agentcore_core::Result<()> { Ok(()) }
        async fn get_session(&self, _id: Uuid) -> agentcore_core::Result<Option<Session>> { Ok(None) }
        async fn update_session(&self, _s: &Session) -> agentcore_core::Result<()> { Ok(()) }
        async fn delete_session(&self, _id: Uuid) -> agentcore_core::Result<()> { Ok(()) }
        async fn append_transcript_entry(&self, _e: &TranscriptEntry) -> agentcore_core::Result<()> { Ok(()) }
        async fn list_transcript(&self, _id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> { Ok(Vec::new()) }
        async fn list_by_owner(
            &self,
            _owner_fp: Fingerprint,
            _filters: &ListFilters,
            _pagination: Pagination,
        ) -> agentcore_core::Result<(Vec<Session>, u64)> {
            Ok((Vec::new(), 0))
        }
    }

    struct NoopCache;
    #[async_trait]
    impl CacheStore for NoopCache {
        async fn get_session(&self, _id: Uuid) -> agentcore_core::Result<Option<Vec<u8>>> { Ok(None) }
        async fn put_session(&self, _id: Uuid, _p: &[u8], _ttl: Duration) -> agentcore_core::Result<()> { Ok(()) }
        async fn delete_session(&self, _id: Uuid) -> agentcore_core::Result<()> { Ok(()) }
        async fn add_to_owner_index(&self, _fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> { Ok(()) }
        async fn remove_from_owner_index(&self, _fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> { Ok(()) }
        async fn set_if_absent(&self, _k: &str, _v: &str, _ttl: Duration) -> agentcore_core::Result<bool> { Ok(true) }
        async fn delete_if_equal(&self, _k: &str, _v: &str) -> agentcore_core::Result<bool> { Ok(true) }
    }

    struct NoopMemory;
    #[async_trait]
    impl MemoryService for NoopMemory {
        async fn add(&self, _fp: Fingerprint, _turns: &[MemoryTurn]) -> agentcore_core::Result<()> { Ok(()) }
        async fn search(&self, _fp: Fingerprint, _q: &str, _k: u32, _g: bool) -> agentcore_core::Result<Vec<MemoryHit>> { Ok(Vec::new()) }
        async fn delete(&self, _fp: Fingerprint, _id: &str) -> agentcore_core::Result<()> { Ok(()) }
    }

    struct NoopRuntime;
    #[async_trait]
    impl AgentRuntime for NoopRuntime {
        async fn invoke(
            &self,
            _prompt: &str,
            _session_id: Option<Uuid>,
            _suffix: Option<&str>,
            _options: &QueryOptions,
        ) -> agentcore_core::Result<Pin<Box<dyn Stream<Item = RuntimeEvent> + Send>>> {
            Err(CoreError::runtime_unavailable("not configured in test"))
        }
    }

    #[test]
    fn router_builds_without_panicking() {
        let state = AppState::new(
            Settings::default(),
            Arc::new(NoopDurable),
            Arc::new(NoopCache),
            Arc::new(NoopMemory),
            Arc::new(NoopRuntime),
        )
        .with_env(None);
        let _ = create_router(state);
    }

    #[test]
    fn bad_uuid_path_param_is_a_validation_error() {
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::Validation);
    }
}
