//! `HttpMemoryService` — the only `MemoryService` implementation: a thin
//! `reqwest`-based client over the external memory store.

use crate::error::MemoryAdapterError;
use agentcore_core::{Fingerprint, MemoryHit, MemoryService, MemoryTurn};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MemoryServiceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl MemoryServiceConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("MEMORY_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090".to_string()),
            request_timeout: Duration::from_secs(5),
        }
    }
}

pub struct HttpMemoryService {
    client: reqwest::Client,
    config: MemoryServiceConfig,
}

impl HttpMemoryService {
    pub fn new(config: MemoryServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builder with static config never fails");
        Self { client, config }
    }

    /// Bridges the external service's request/response cycle to the
    /// orchestrator's cooperative scheduler: each call is off-loaded onto
    /// the async runtime's own connection pool and wrapped in a bounded
    /// timeout, rather than blocking a worker thread.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, MemoryAdapterError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = tokio::time::timeout(self.config.request_timeout, req.send())
            .await
            .map_err(|_| MemoryAdapterError::Timeout)?
            .map_err(|e| MemoryAdapterError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryAdapterError::Transport(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MemoryAdapterError::Malformed(e.to_string()))
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<MemoryHit>,
}

#[derive(Deserialize)]
struct RecordResponse {
    user_fp: String,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn add(&self, user_fp: Fingerprint, turns: &[MemoryTurn]) -> agentcore_core::Result<()> {
        let body = serde_json::json!({
            "user_fp": user_fp.to_hex(),
            "turns": turns,
        });
        self.call::<Empty>(reqwest::Method::POST, "/v1/memories", Some(body))
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    async fn search(
        &self,
        user_fp: Fingerprint,
        query: &str,
        k: u32,
        enable_graph: bool,
    ) -> agentcore_core::Result<Vec<MemoryHit>> {
        let body = serde_json::json!({
            "user_fp": user_fp.to_hex(),
            "query": query,
            "k": k,
            "enable_graph": enable_graph,
        });
        let response = self
            .call::<SearchResponse>(reqwest::Method::POST, "/v1/memories/search", Some(body))
            .await
            .map_err(agentcore_core::CoreError::from)?;
        Ok(response.hits)
    }

    async fn delete(&self, user_fp: Fingerprint, id: &str) -> agentcore_core::Result<()> {
        // Ownership re-check: fetch the record first and compare its
        // stored user_fp before issuing the delete (§4.3).
        let record = self
            .call::<RecordResponse>(reqwest::Method::GET, &format!("/v1/memories/{id}"), None)
            .await
            .map_err(agentcore_core::CoreError::from)?;

        let stored_fp = Fingerprint::from_hex(&record.user_fp).ok_or_else(|| {
            agentcore_core::CoreError::internal("memory service returned malformed user_fp")
        })?;
        if stored_fp.to_hex() != user_fp.to_hex() {
            return Err(agentcore_core::CoreError::not_found("memory record not found"));
        }

        self.call::<Empty>(reqwest::Method::DELETE, &format!("/v1/memories/{id}"), None)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }
}
