//! Memory Adapter (§4.3): a tenant-isolated façade over an external memory
//! service, reachable only through `agentcore_core::MemoryService`.

pub mod client;
pub mod error;

pub use client::{HttpMemoryService, MemoryServiceConfig};
pub use error::MemoryAdapterError;

#[cfg(test)]
pub mod fakes {
    //! In-memory `MemoryService` used by orchestrator/session-manager tests.
    use agentcore_core::{CoreError, Fingerprint, MemoryHit, MemoryService, MemoryTurn};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemoryMemoryService {
        records: Mutex<HashMap<String, (Fingerprint, String)>>,
        next_id: Mutex<u64>,
    }

    #[async_trait]
    impl MemoryService for InMemoryMemoryService {
        async fn add(&self, user_fp: Fingerprint, turns: &[MemoryTurn]) -> agentcore_core::Result<()> {
            let mut records = self.records.lock();
            let mut next_id = self.next_id.lock();
            for turn in turns {
                let id = next_id.to_string();
                *next_id += 1;
                records.insert(id, (user_fp, turn.content.to_string()));
            }
            Ok(())
        }

        async fn search(
            &self,
            user_fp: Fingerprint,
            _query: &str,
            k: u32,
            _enable_graph: bool,
        ) -> agentcore_core::Result<Vec<MemoryHit>> {
            let records = self.records.lock();
            Ok(records
                .iter()
                .filter(|(_, (fp, _))| *fp == user_fp)
                .take(k as usize)
                .map(|(id, (_, content))| MemoryHit {
                    id: id.clone(),
                    content: content.clone(),
                    score: 1.0,
                    metadata: serde_json::json!({}),
                })
                .collect())
        }

        async fn delete(&self, user_fp: Fingerprint, id: &str) -> agentcore_core::Result<()> {
            let mut records = self.records.lock();
            match records.get(id) {
                Some((fp, _)) if *fp == user_fp => {
                    records.remove(id);
                    Ok(())
                }
                _ => Err(CoreError::not_found("memory record not found")),
            }
        }
    }
}
