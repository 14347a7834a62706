//! Session lock acquisition/release over the cache store's set-if-absent
//! primitive (§4.2.3).

use agentcore_core::{
    CacheStore, CoreError, DeploymentMode, LockToken, DEFAULT_LOCK_TTL_MS, LOCK_BACKOFF_CAP_MS,
    LOCK_BACKOFF_FACTOR, LOCK_BACKOFF_INITIAL_MS, LOCK_MAX_WAIT_MS,
};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct LockManager {
    cache: Arc<dyn CacheStore>,
    mode: DeploymentMode,
}

impl LockManager {
    pub fn new(cache: Arc<dyn CacheStore>, mode: DeploymentMode) -> Self {
        Self { cache, mode }
    }

    fn lock_key(session_id: Uuid) -> String {
        format!("lock:session:{session_id}")
    }

    /// Acquires the lock for `session_id`, blocking (cooperatively) with
    /// exponential backoff and jitter until it succeeds or the 15s budget
    /// is exhausted. Returns `None` when no lock was taken because the
    /// cache is unreachable in single-instance mode (proceed unlocked).
    pub async fn acquire(&self, session_id: Uuid) -> agentcore_core::Result<Option<LockToken>> {
        let holder_id = agentcore_core::lock::random_holder_id();
        let holder_str = holder_id.to_string();
        let key = Self::lock_key(session_id);
        let ttl = Duration::from_millis(DEFAULT_LOCK_TTL_MS);

        let mut delay_ms = LOCK_BACKOFF_INITIAL_MS;
        let mut waited_ms: u64 = 0;

        loop {
            match self.cache.set_if_absent(&key, &holder_str, ttl).await {
                Ok(true) => {
                    let expires_at = Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64);
                    return Ok(Some(LockToken::new(session_id, holder_id, expires_at)));
                }
                Ok(false) => {
                    if waited_ms >= LOCK_MAX_WAIT_MS {
                        return Err(CoreError::locked("session is locked by another request"));
                    }
                    let jitter = rand::thread_rng().gen_range(0..=(delay_ms / 2).max(1));
                    let sleep_for = delay_ms + jitter;
                    tokio::time::sleep(Duration::from_millis(sleep_for)).await;
                    waited_ms += sleep_for;
                    delay_ms = (delay_ms * LOCK_BACKOFF_FACTOR).min(LOCK_BACKOFF_CAP_MS);
                }
                Err(err) => {
                    return match self.mode {
                        DeploymentMode::SingleInstance => {
                            tracing::debug!(session_id = %session_id, "cache unreachable, proceeding without lock");
                            Ok(None)
                        }
                        DeploymentMode::Distributed => {
                            tracing::error!(session_id = %session_id, "cache unreachable on lock path in distributed mode");
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Releases the lock iff it is still held by `token.holder_id` — never
    /// another holder's lock.
    pub async fn release(&self, token: &LockToken) {
        let key = Self::lock_key(token.session_id);
        match self
            .cache
            .delete_if_equal(&key, &token.holder_id.to_string())
            .await
        {
            Ok(true) | Ok(false) => {}
            Err(err) => {
                tracing::debug!(session_id = %token.session_id, error = %err, "lock release failed, will expire via TTL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_core::CoreError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeCache {
        kv: Mutex<HashMap<String, String>>,
        fail_set: bool,
    }

    #[async_trait]
    impl CacheStore for FakeCache {
        async fn get_session(&self, _id: Uuid) -> agentcore_core::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn put_session(&self, _id: Uuid, _payload: &[u8], _ttl: Duration) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn delete_session(&self, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn add_to_owner_index(&self, _owner_fp: agentcore_core::Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn remove_from_owner_index(&self, _owner_fp: agentcore_core::Fingerprint, _id: Uuid) -> agentcore_core::Result<()> {
            Ok(())
        }
        async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> agentcore_core::Result<bool> {
            if self.fail_set {
                return Err(CoreError::unavailable("cache down"));
            }
            let mut kv = self.kv.lock();
            if kv.contains_key(key) {
                Ok(false)
            } else {
                kv.insert(key.to_string(), value.to_string());
                Ok(true)
            }
        }
        async fn delete_if_equal(&self, key: &str, expected_value: &str) -> agentcore_core::Result<bool> {
            let mut kv = self.kv.lock();
            if kv.get(key).map(String::as_str) == Some(expected_value) {
                kv.remove(key);
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    #[tokio::test]
    async fn acquires_when_absent() {
        let cache = Arc::new(FakeCache::default());
        let manager = LockManager::new(cache, DeploymentMode::SingleInstance);
        let token = manager.acquire(Uuid::new_v4()).await.unwrap();
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn second_acquire_blocks_until_release() {
        let cache = Arc::new(FakeCache::default());
        let manager = LockManager::new(cache.clone(), DeploymentMode::SingleInstance);
        let id = Uuid::new_v4();
        let token = manager.acquire(id).await.unwrap().unwrap();

        let manager2 = LockManager::new(cache, DeploymentMode::SingleInstance);
        let release_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.release(&release_token).await;
        });
        let second = manager2.acquire(id).await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn single_instance_proceeds_unlocked_when_cache_down() {
        let cache = Arc::new(FakeCache {
            fail_set: true,
            ..Default::default()
        });
        let manager = LockManager::new(cache, DeploymentMode::SingleInstance);
        let token = manager.acquire(Uuid::new_v4()).await.unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn distributed_mode_fails_fast_when_cache_down() {
        let cache = Arc::new(FakeCache {
            fail_set: true,
            ..Default::default()
        });
        let manager = LockManager::new(cache, DeploymentMode::Distributed);
        let result = manager.acquire(Uuid::new_v4()).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, agentcore_core::ErrorKind::Unavailable);
    }
}
