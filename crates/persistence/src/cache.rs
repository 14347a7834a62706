//! `RedisCacheStore` — volatile, TTL'd accelerator and lock primitive
//! backing store (§4.2.1, §4.2.3).

use crate::error::PersistenceError;
use agentcore_core::{CacheStore, Fingerprint};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(Self { conn })
    }

    fn session_key(id: Uuid) -> String {
        format!("session:{id}")
    }

    fn owner_index_key(owner_fp: Fingerprint) -> String {
        format!("owner-index:{}", owner_fp.to_hex())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get_session(&self, id: Uuid) -> agentcore_core::Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(Self::session_key(id))
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(value)
    }

    async fn put_session(&self, id: Uuid, payload: &[u8], ttl: Duration) -> agentcore_core::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::session_key(id), payload, ttl.as_secs().max(1))
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> agentcore_core::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::session_key(id))
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(())
    }

    async fn add_to_owner_index(&self, owner_fp: Fingerprint, id: Uuid) -> agentcore_core::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(Self::owner_index_key(owner_fp), id.to_string())
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(())
    }

    async fn remove_from_owner_index(&self, owner_fp: Fingerprint, id: Uuid) -> agentcore_core::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .srem(Self::owner_index_key(owner_fp), id.to_string())
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> agentcore_core::Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn delete_if_equal(&self, key: &str, expected_value: &str) -> agentcore_core::Result<bool> {
        let mut conn = self.conn.clone();
        // Lua script keeps compare-and-delete atomic; a holder can never
        // release a lock it does not currently own.
        const SCRIPT: &str = r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#;
        let deleted: i64 = redis::Script::new(SCRIPT)
            .key(key)
            .arg(expected_value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| PersistenceError::CacheConnection(e.to_string()))?;
        Ok(deleted == 1)
    }
}
