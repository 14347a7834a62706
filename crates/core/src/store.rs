//! Trait seams for the durable and cache stores (§4.2.1).
//!
//! Concrete implementations live in `agentcore-persistence`; this crate only
//! describes the contract so `agentcore-sessions` can depend on the
//! interface and tests can substitute in-memory fakes.

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::session::{Session, TranscriptEntry};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Active,
    Completed,
    Error,
}

/// Filters accepted by `DurableStore::list`. All evaluated server-side by
/// the store's own query layer — no fetch-all-then-filter-in-memory.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub mode: Option<crate::session::SessionMode>,
    pub project_id: Option<String>,
    pub tag_contains: Option<String>,
    pub status: Option<StatusFilter>,
    pub text_search: Option<String>,
    /// Arbitrary JSON-path predicate against `session_metadata`.
    pub metadata_predicate: Option<(String, Value)>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_PAGE_SIZE: u32 = 50;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page < 1 {
            return Err(crate::error::CoreError::validation("page must be >= 1"));
        }
        if !(1..=Self::MAX_PAGE_SIZE).contains(&page_size) {
            return Err(crate::error::CoreError::validation(
                "page_size must be within [1, 100]",
            ));
        }
        Ok(Self { page, page_size })
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// A pure function of the old session state producing the new one; applied
/// under the session lock so no interleaving can observe an intermediate
/// state.
pub type SessionMutator<'a> = Box<dyn FnOnce(&Session) -> Result<Session> + Send + 'a>;

/// The authoritative persistent repository of sessions and transcripts.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;

    /// Replaces the stored session with `updated` iff the stored row still
    /// matches `expected_updated_at` — the compound compare-and-swap the
    /// lock-protected mutator relies on to avoid lost updates.
    async fn update_session(&self, updated: &Session) -> Result<()>;

    async fn delete_session(&self, id: Uuid) -> Result<()>;

    async fn append_transcript_entry(&self, entry: &TranscriptEntry) -> Result<()>;

    async fn list_transcript(&self, session_id: Uuid) -> Result<Vec<TranscriptEntry>>;

    async fn list_by_owner(
        &self,
        owner_fp: Fingerprint,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> Result<(Vec<Session>, u64)>;
}

/// The volatile, TTL'd accelerator used for read-through and lock
/// coordination. Every method is best-effort from the caller's perspective
/// in the sense that failures are surfaced, not silently swallowed; the
/// Session Manager decides how to react.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_session(&self, id: Uuid) -> Result<Option<Vec<u8>>>;

    async fn put_session(&self, id: Uuid, payload: &[u8], ttl: Duration) -> Result<()>;

    async fn delete_session(&self, id: Uuid) -> Result<()>;

    async fn add_to_owner_index(&self, owner_fp: Fingerprint, id: Uuid) -> Result<()>;

    async fn remove_from_owner_index(&self, owner_fp: Fingerprint, id: Uuid) -> Result<()>;

    /// `SET key value NX PX ttl`-shaped primitive: succeeds only if the key
    /// was previously absent. Returns `true` on acquisition.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Compare-and-delete: removes `key` only if its current value equals
    /// `expected_value`, so a holder can never release someone else's lock.
    async fn delete_if_equal(&self, key: &str, expected_value: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rejects_page_zero() {
        assert!(Pagination::new(0, 10).is_err());
    }

    #[test]
    fn pagination_rejects_oversized_page() {
        assert!(Pagination::new(1, 101).is_err());
    }

    #[test]
    fn pagination_defaults_match_spec() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 50);
    }
}
