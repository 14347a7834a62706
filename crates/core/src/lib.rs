//! Shared domain types, the public error taxonomy, and the trait seams that
//! every other crate in this workspace implements or depends on.

pub mod deployment;
pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod memory;
pub mod runtime;
pub mod session;
pub mod store;

pub use deployment::DeploymentMode;
pub use error::{CoreError, ErrorKind, Result};
pub use fingerprint::{Fingerprint, Owner};
pub use lock::{LockToken, DEFAULT_LOCK_TTL_MS, LOCK_BACKOFF_CAP_MS, LOCK_BACKOFF_FACTOR,
    LOCK_BACKOFF_INITIAL_MS, LOCK_MAX_WAIT_MS};
pub use memory::{MemoryHit, MemoryService, MemoryTurn};
pub use runtime::{AgentRuntime, QueryOptions, RuntimeEvent};
pub use session::{NewSession, Session, SessionMode, SessionStatus, TranscriptEntry,
    TranscriptRole};
pub use store::{CacheStore, DurableStore, ListFilters, Pagination, SessionMutator, StatusFilter};
