//! `SessionManager` — the Session Manager component (§4.2).

use crate::lock_manager::LockManager;
use agentcore_core::{
    CacheStore, CoreError, DurableStore, Fingerprint, ListFilters, NewSession, Owner, Pagination,
    Session, SessionMode, SessionStatus, TranscriptEntry,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Read-through cache TTL; independent of the lock TTL.
const SESSION_CACHE_TTL: Duration = Duration::from_secs(300);
/// Bytes of a corrupted cache payload logged alongside the self-heal.
const CORRUPT_SAMPLE_LEN: usize = 200;

pub struct SessionManager {
    durable: Arc<dyn DurableStore>,
    cache: Arc<dyn CacheStore>,
    locks: LockManager,
}

impl SessionManager {
    pub fn new(durable: Arc<dyn DurableStore>, cache: Arc<dyn CacheStore>, locks: LockManager) -> Self {
        Self { durable, cache, locks }
    }

    /// The sole ownership-enforcement code path (§4.2.4). Every externally
    /// reachable operation delegates here; returns `NOT_FOUND` — never
    /// `FORBIDDEN` — on mismatch so a caller cannot use the response to
    /// enumerate other tenants' sessions.
    fn enforce_owner(session: Session, caller_fp: Fingerprint) -> agentcore_core::Result<Session> {
        match session.owner {
            Owner::Owned(owner_fp) if agentcore_hashing::equal(owner_fp, caller_fp) => Ok(session),
            Owner::Owned(_) => Err(CoreError::not_found("session not found")),
            // Public/anonymous sessions are reserved for internal callers;
            // the public HTTP surface never reaches this branch because it
            // never creates or addresses one.
            Owner::Public => Ok(session),
        }
    }

    pub async fn create(&self, payload: NewSession, caller_fp: Fingerprint) -> agentcore_core::Result<Session> {
        self.create_with_id(Uuid::new_v4(), payload, caller_fp).await
    }

    /// Creates a session under a caller-supplied id rather than a freshly
    /// generated one. Used by the orchestrator's persistence step, where
    /// the agent runtime — not this manager — is the sole source of the
    /// authoritative session id (§4.4.1 step 6).
    pub async fn create_with_id(
        &self,
        id: Uuid,
        payload: NewSession,
        caller_fp: Fingerprint,
    ) -> agentcore_core::Result<Session> {
        let now = Utc::now();
        let session = Session {
            id,
            mode: payload.mode,
            status: SessionStatus::Active,
            owner: Owner::Owned(caller_fp),
            parent_id: payload.parent_id,
            model: payload.model,
            total_turns: 0,
            total_cost_micros: 0,
            created_at: now,
            updated_at: now,
            last_message_at: None,
            metadata: payload.metadata,
            tags: Vec::new(),
            title: payload.title,
        };

        self.durable.create_session(&session).await?;
        self.write_cache_best_effort(&session).await;
        Ok(session)
    }

    pub async fn get(&self, id: Uuid, caller_fp: Fingerprint) -> agentcore_core::Result<Session> {
        if let Some(cached) = self.read_cache_best_effort(id).await {
            return Self::enforce_owner(cached, caller_fp);
        }

        let session = self
            .durable
            .get_session(id)
            .await?
            .ok_or_else(|| CoreError::not_found("session not found"))?;
        self.write_cache_best_effort(&session).await;
        Self::enforce_owner(session, caller_fp)
    }

    /// Attempts the cache read; on miss or parse failure it self-heals by
    /// deleting the corrupt entry and logging, then returns `None` so the
    /// caller falls through to the durable store (§4.2.2, invariant 3).
    async fn read_cache_best_effort(&self, id: Uuid) -> Option<Session> {
        let raw = match self.cache.get_session(id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(session_id = %id, error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                let sample: String = String::from_utf8_lossy(&raw)
                    .chars()
                    .take(CORRUPT_SAMPLE_LEN)
                    .collect();
                tracing::error!(
                    session_id = %id,
                    error_id = "ERR_CACHE_PARSE_FAILED",
                    sample = %sample,
                    error = %err,
                    "cache entry failed to deserialize, self-healing"
                );
                let _ = self.cache.delete_session(id).await;
                None
            }
        }
    }

    async fn write_cache_best_effort(&self, session: &Session) {
        let Ok(payload) = serde_json::to_vec(session) else {
            tracing::error!(session_id = %session.id, "failed to serialize session for cache write");
            return;
        };
        if let Err(err) = self.cache.put_session(session.id, &payload, SESSION_CACHE_TTL).await {
            tracing::debug!(session_id = %session.id, error = %err, "cache write failed");
        }
        if let Owner::Owned(fp) = session.owner {
            if let Err(err) = self.cache.add_to_owner_index(fp, session.id).await {
                tracing::debug!(session_id = %session.id, error = %err, "owner index cache write failed");
            }
        }
    }

    /// Shared lock/read/mutate/write path used by `update`, `promote`,
    /// `update_tags`, and `fork`'s parent-linking.
    async fn mutate<F>(&self, id: Uuid, caller_fp: Fingerprint, mutator: F) -> agentcore_core::Result<Session>
    where
        F: FnOnce(&Session) -> agentcore_core::Result<Session> + Send,
    {
        let token = self.locks.acquire(id).await?;
        let result = self.mutate_locked(id, caller_fp, mutator).await;
        if let Some(token) = token {
            self.locks.release(&token).await;
        }
        result
    }

    async fn mutate_locked<F>(&self, id: Uuid, caller_fp: Fingerprint, mutator: F) -> agentcore_core::Result<Session>
    where
        F: FnOnce(&Session) -> agentcore_core::Result<Session> + Send,
    {
        let current = self
            .durable
            .get_session(id)
            .await?
            .ok_or_else(|| CoreError::not_found("session not found"))?;
        let current = Self::enforce_owner(current, caller_fp)?;

        if current.status.is_terminal() {
            return Err(CoreError::terminal("session is already terminal"));
        }

        let mut updated = mutator(&current)?;
        updated.updated_at = Utc::now();

        self.durable.update_session(&updated).await?;
        self.write_cache_best_effort(&updated).await;
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        caller_fp: Fingerprint,
        new_status: SessionStatus,
    ) -> agentcore_core::Result<Session> {
        self.mutate(id, caller_fp, move |current| {
            if !current.status.can_transition_to(new_status) {
                return Err(CoreError::terminal("illegal status transition"));
            }
            let mut next = current.clone();
            next.status = new_status;
            Ok(next)
        })
        .await
    }

    pub async fn record_turn(
        &self,
        id: Uuid,
        caller_fp: Fingerprint,
        additional_turns: u32,
        additional_cost_micros: u64,
    ) -> agentcore_core::Result<Session> {
        self.mutate(id, caller_fp, move |current| {
            let mut next = current.clone();
            next.total_turns += additional_turns;
            next.total_cost_micros += additional_cost_micros;
            next.last_message_at = Some(Utc::now());
            Ok(next)
        })
        .await
    }

    pub async fn promote(
        &self,
        id: Uuid,
        project_id: String,
        caller_fp: Fingerprint,
    ) -> agentcore_core::Result<Session> {
        self.mutate(id, caller_fp, move |current| {
            let already = current
                .metadata
                .get("project_id")
                .and_then(|v| v.as_str())
                .map(|v| v == project_id)
                .unwrap_or(false);
            if already {
                // Idempotent no-op per the resolved open question (c).
                return Ok(current.clone());
            }
            let mut next = current.clone();
            next.metadata.insert("project_id".to_string(), serde_json::Value::String(project_id));
            Ok(next)
        })
        .await
    }

    pub async fn update_tags(
        &self,
        id: Uuid,
        tags: Vec<String>,
        caller_fp: Fingerprint,
    ) -> agentcore_core::Result<Session> {
        self.mutate(id, caller_fp, move |current| {
            let mut next = current.clone();
            next.tags = tags;
            Ok(next)
        })
        .await
    }

    /// Additive supplement: forks `parent_id` into a new session inheriting
    /// mode/model, grounded in the session-orchestrator fork pattern.
    pub async fn fork(&self, parent_id: Uuid, caller_fp: Fingerprint) -> agentcore_core::Result<Session> {
        let parent = self.get(parent_id, caller_fp).await?;
        self.create(
            NewSession {
                mode: parent.mode,
                model: parent.model.clone(),
                parent_id: Some(parent.id),
                title: parent.title.clone(),
                metadata: parent.metadata.clone(),
            },
            caller_fp,
        )
        .await
    }

    pub async fn delete(&self, id: Uuid, caller_fp: Fingerprint) -> agentcore_core::Result<()> {
        let token = self.locks.acquire(id).await?;
        let result = self.delete_locked(id, caller_fp).await;
        if let Some(token) = token {
            self.locks.release(&token).await;
        }
        result
    }

    async fn delete_locked(&self, id: Uuid, caller_fp: Fingerprint) -> agentcore_core::Result<()> {
        let current = self
            .durable
            .get_session(id)
            .await?
            .ok_or_else(|| CoreError::not_found("session not found"))?;
        let current = Self::enforce_owner(current, caller_fp)?;

        self.durable.delete_session(id).await?;
        // Idempotent with respect to a missing cache entry.
        let _ = self.cache.delete_session(id).await;
        if let Owner::Owned(fp) = current.owner {
            let _ = self.cache.remove_from_owner_index(fp, id).await;
        }
        Ok(())
    }

    pub async fn list(
        &self,
        caller_fp: Fingerprint,
        filters: ListFilters,
        pagination: Pagination,
    ) -> agentcore_core::Result<(Vec<Session>, u64)> {
        self.durable.list_by_owner(caller_fp, &filters, pagination).await
    }

    pub async fn append_transcript(&self, entry: TranscriptEntry) -> agentcore_core::Result<()> {
        self.durable.append_transcript_entry(&entry).await
    }

    pub async fn get_transcript(&self, session_id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> {
        self.durable.list_transcript(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_core::{CacheStore, ErrorKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDurable {
        sessions: Mutex<HashMap<Uuid, Session>>,
    }

    #[async_trait]
    impl DurableStore for FakeDurable {
        async fn create_session(&self, session: &Session) -> agentcore_core::Result<()> {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&session.id) {
                return Err(CoreError::already_exists("duplicate"));
            }
            sessions.insert(session.id, session.clone());
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
        async fn append_transcript_entry(&self, _entry: &TranscriptEntry) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn list_transcript(&self, _session_id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> {
            Ok(Vec::new())
        }
        async fn list_by_owner(
            &self,
            owner_fp: Fingerprint,
            _filters: &ListFilters,
            pagination: Pagination,
        ) -> agentcore_core::Result<(Vec<Session>, u64)> {
            let sessions = self.sessions.lock();
            let matching: Vec<Session> = sessions
                .values()
                .filter(|s| s.owner_fingerprint() == Some(owner_fp))
                .cloned()
                .collect();
            let total = matching.len() as u64;
            let start = ((pagination.page - 1) * pagination.page_size) as usize;
            let end = (start + pagination.page_size as usize).min(matching.len());
            Ok((matching.get(start..end).unwrap_or(&[]).to_vec(), total))
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

    fn test_manager() -> SessionManager {
        let durable = Arc::new(FakeDurable::default());
        let cache = Arc::new(FakeCache::default());
        let locks = LockManager::new(cache.clone(), agentcore_core::DeploymentMode::SingleInstance);
        SessionManager::new(durable, cache, locks)
    }

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::from_bytes([seed; 32])
    }

    fn new_payload() -> NewSession {
        NewSession {
            mode: SessionMode::Code,
            model: "claude".to_string(),
            parent_id: None,
            title: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_owner() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        let fetched = manager.get(created.id, fp(1)).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.owner_fingerprint(), Some(fp(1)));
    }

    #[tokio::test]
    async fn get_by_wrong_owner_is_not_found() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        let result = manager.get(created.id, fp(2)).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn corrupted_cache_entry_self_heals() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        manager.cache.put_session(created.id, b"{garbage", Duration::from_secs(60)).await.unwrap();

        let fetched = manager.get(created.id, fp(1)).await.unwrap();
        assert_eq!(fetched.id, created.id);

        let healed = manager.cache.get_session(created.id).await.unwrap();
        assert!(healed.is_none() || serde_json::from_slice::<Session>(&healed.unwrap()).is_ok());
    }

    #[tokio::test]
    async fn terminal_session_rejects_further_mutation() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        manager.update_status(created.id, fp(1), SessionStatus::Completed).await.unwrap();
        let result = manager.update_tags(created.id, vec!["x".into()], fp(1)).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Terminal);
    }

    #[tokio::test]
    async fn delete_is_idempotent_from_client_standpoint() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        manager.delete(created.id, fp(1)).await.unwrap();
        let second = manager.delete(created.id, fp(1)).await;
        assert_eq!(second.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn promote_is_idempotent_when_project_already_set() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        let first = manager.promote(created.id, "proj-1".to_string(), fp(1)).await.unwrap();
        let second = manager.promote(created.id, "proj-1".to_string(), fp(1)).await.unwrap();
        assert_eq!(first.metadata.get("project_id"), second.metadata.get("project_id"));
    }

    #[tokio::test]
    async fn no_op_update_advances_updated_at_only() {
        let manager = test_manager();
        let created = manager.create(new_payload(), fp(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let updated = manager.update_tags(created.id, created.tags.clone(), fp(1)).await.unwrap();
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.tags, created.tags);
        assert_eq!(updated.total_turns, created.total_turns);
    }

    #[tokio::test]
    async fn fork_creates_new_session_with_parent_id() {
        let manager = test_manager();
        let parent = manager.create(new_payload(), fp(1)).await.unwrap();
        let child = manager.fork(parent.id, fp(1)).await.unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
        assert_ne!(child.id, parent.id);
    }
}
