//! Application state shared across all handlers.

use agentcore_config::{load_settings, Settings};
use agentcore_core::{AgentRuntime, CacheStore, DurableStore, MemoryService};
use agentcore_orchestrator::Orchestrator;
use agentcore_sessions::{LockManager, SessionManager};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Wrapped in a lock so `/admin/reload-config` can hot-swap it without
    /// a restart (§1.3); `deployment_mode` inside is read once at boot and
    /// never re-read after the lock manager is constructed.
    pub config: Arc<RwLock<Settings>>,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub durable: Arc<dyn DurableStore>,
    pub cache: Arc<dyn CacheStore>,
    pub memory: Arc<dyn MemoryService>,
    /// Environment name, carried only so `reload_config` can re-run the same
    /// layered load `main` performed at boot.
    env: Option<String>,
    /// Absent only in tests that never call `init_metrics`.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Settings,
        durable: Arc<dyn DurableStore>,
        cache: Arc<dyn CacheStore>,
        memory: Arc<dyn MemoryService>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        let locks = LockManager::new(cache.clone(), config.deployment_mode);
        let sessions = Arc::new(SessionManager::new(durable.clone(), cache.clone(), locks));
        let orchestrator = Arc::new(Orchestrator::new(sessions.clone(), memory.clone(), runtime));

        Self {
            config: Arc::new(RwLock::new(config)),
            sessions,
            orchestrator,
            durable,
            cache,
            memory,
            env: None,
            metrics_handle: None,
        }
    }

    /// Carries the environment name through so a later `reload_config` call
    /// re-runs the same layered load `main` used at boot.
    pub fn with_env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Reloads `Settings` from files and environment (never session state).
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config =
            load_settings(self.env.as_deref()).map_err(|e| format!("failed to reload config: {e}"))?;
        let mut config = self.config.write();
        *config = new_config;
        tracing::info!("configuration reloaded");
        Ok(())
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_core::{CoreError, Fingerprint, ListFilters, MemoryHit, MemoryTurn, Pagination,
        QueryOptions, RuntimeEvent, Session, TranscriptEntry};
    use async_trait::async_trait;
    use futures::Stream;
    use std::pin::Pin;
    use std::time::Duration;
    use uuid::Uuid;

    struct NoopDurable;
    #[async_trait]
    impl DurableStore for NoopDurable {
        async fn create_session(&self, _session: &Session) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn get_session(&self, _id: Uuid) -> agentcore_core::Result<Option<Session>> {
            Ok(None)
        }
        async fn update_session(&self, _updated: &Session) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn delete_session(&self, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn append_transcript_entry(&self, _entry: &TranscriptEntry) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn list_transcript(&self, _session_id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> {
            Ok(Vec::new())
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

    struct NoopCache;
    #[async_trait]
    impl CacheStore for NoopCache {
        async fn get_session(&self, _id: Uuid) -> agentcore_core::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn put_session(&self, _id: Uuid, _payload: &[u8], _ttl: Duration) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn delete_session(&self, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn add_to_owner_index(&self, _owner_fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn remove_from_owner_index(&self, _owner_fp: Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> agentcore_core::Result<bool> {
            Ok(true)
        }
        async fn delete_if_equal(&self, _key: &str, _expected_value: &str) -> agentcore_core::Result<bool> {
            Ok(true)
        }
    }

    struct NoopMemory;
    #[async_trait]
    impl MemoryService for NoopMemory {
        async fn add(&self, _user_fp: Fingerprint, _turns: &[MemoryTurn]) -> agentcore_core::Result<()> {
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

    struct NoopRuntime;
    #[async_trait]
    impl AgentRuntime for NoopRuntime {
        async fn invoke(
            &self,
            _prompt: &str,
            _session_id: Option<Uuid>,
            _system_prompt_suffix: Option<&str>,
            _options: &QueryOptions,
        ) -> agentcore_core::Result<Pin<Box<dyn Stream<Item = RuntimeEvent> + Send>>> {
            Err(CoreError::runtime_unavailable("not configured in test"))
        }
    }

    #[test]
    fn builds_with_all_collaborators() {
        let state = AppState::new(
            Settings::default(),
            Arc::new(NoopDurable),
            Arc::new(NoopCache),
            Arc::new(NoopMemory),
            Arc::new(NoopRuntime),
        )
        .with_env(None);

        assert_eq!(state.get_config().server.port, 8080);
    }
}
