//! Memory Adapter trait seam (§4.3) and supporting types.

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::session::TranscriptRole;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTurn {
    pub role: TranscriptRole,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub metadata: Value,
}

/// Tenant-isolated façade over the external memory service. Every method
/// takes the caller's fingerprint, never a plaintext key, and every
/// implementation MUST scope reads/writes to that fingerprint alone.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn add(&self, user_fp: Fingerprint, turns: &[MemoryTurn]) -> Result<()>;

    async fn search(
        &self,
        user_fp: Fingerprint,
        query: &str,
        k: u32,
        enable_graph: bool,
    ) -> Result<Vec<MemoryHit>>;

    /// Refuses deletion if `id` is not owned by `user_fp` (§4.3 re-check).
    async fn delete(&self, user_fp: Fingerprint, id: &str) -> Result<()>;
}
