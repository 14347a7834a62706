//! Session lock token (§3.4, §4.2.3).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Default TTL applied to a freshly acquired session lock.
pub const DEFAULT_LOCK_TTL_MS: u64 = 30_000;

/// Backoff schedule for lock acquisition, per §4.2.3.
pub const LOCK_BACKOFF_INITIAL_MS: u64 = 10;
pub const LOCK_BACKOFF_FACTOR: u64 = 2;
pub const LOCK_BACKOFF_CAP_MS: u64 = 1_000;
pub const LOCK_MAX_WAIT_MS: u64 = 15_000;

/// One holder's claim on a session's mutual-exclusion slot.
///
/// Exactly one `LockToken` may be valid for a given `session_id` at a time;
/// release is always keyed by `holder_id` so a stale holder can never
/// release someone else's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub session_id: Uuid,
    pub holder_id: u128,
    pub expires_at: DateTime<Utc>,
}

impl LockToken {
    pub fn new(session_id: Uuid, holder_id: u128, expires_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            holder_id,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Draws a fresh 128-bit holder id. Not a cryptographic commitment, just
/// wide enough that two concurrent acquirers never collide.
pub fn random_holder_id() -> u128 {
    rand::random::<u128>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let token = LockToken::new(Uuid::nil(), 1, now);
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::milliseconds(1)));
    }

    #[test]
    fn holder_ids_are_not_trivially_equal() {
        assert_ne!(random_holder_id(), random_holder_id());
    }
}
