//! Credential Hasher (§4.1).
//!
//! `fingerprint` is the one-way, deterministic transform every other crate
//! uses in place of a plaintext API key. `equal` compares two fingerprints
//! in constant time so a caller cannot learn anything about a mismatch by
//! timing a request.

use agentcore_core::Fingerprint;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Bound on the per-process fingerprint cache. Large enough to amortise the
/// repeated `equal`/ownership checks a single request performs, small enough
/// that a key never lingers past the handful of requests that touch it.
const CACHE_CAPACITY: usize = 256;

struct FingerprintCache {
    // Insertion order for simple FIFO eviction; keyed by the raw input
    // bytes, so the cache never outlives the process and is bounded.
    order: VecDeque<Vec<u8>>,
    entries: std::collections::HashMap<Vec<u8>, Fingerprint>,
}

impl FingerprintCache {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(CACHE_CAPACITY),
            entries: std::collections::HashMap::with_capacity(CACHE_CAPACITY),
        }
    }

    fn get(&self, key: &[u8]) -> Option<Fingerprint> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: Vec<u8>, fp: Fingerprint) {
        if self.entries.contains_key(&key) {
            return;
        }
        if self.order.len() >= CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, fp);
    }
}

static CACHE: Lazy<Mutex<FingerprintCache>> = Lazy::new(|| Mutex::new(FingerprintCache::new()));

/// Deterministic one-way transform of an API key into a 32-byte fingerprint.
///
/// No salt: API keys are already high-entropy and cross-process determinism
/// is required so the same key always indexes the same tenant.
pub fn fingerprint(key: &[u8]) -> Fingerprint {
    if let Some(cached) = CACHE.lock().get(key) {
        return cached;
    }
    let mut hasher = Sha256::new();
    hasher.update(key);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    let fp = Fingerprint::from_bytes(bytes);
    CACHE.lock().insert(key.to_vec(), fp);
    fp
}

/// Constant-time comparison of two fingerprints.
///
/// `subtle` is not part of this workspace's dependency tree, so the compare
/// is hand-rolled: XOR every byte pair and fold with OR, never branching on
/// an intermediate result.
pub fn equal(a: Fingerprint, b: Fingerprint) -> bool {
    let mut diff: u8 = 0;
    for (x, y) in a.0.iter().zip(b.0.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        assert!(equal(fingerprint(b"abc"), fingerprint(b"abc")));
    }

    #[test]
    fn distinct_for_distinct_input() {
        assert!(!equal(fingerprint(b"abc"), fingerprint(b"xyz")));
    }

    #[test]
    fn output_is_32_bytes() {
        assert_eq!(fingerprint(b"abc").0.len(), 32);
    }

    #[test]
    fn equal_is_reflexive_and_symmetric() {
        let fp = fingerprint(b"caller-key");
        assert!(equal(fp, fp));
        let other = fingerprint(b"different-key");
        assert_eq!(equal(fp, other), equal(other, fp));
    }

    #[test]
    fn cache_eviction_does_not_change_result() {
        for i in 0..(CACHE_CAPACITY * 2) {
            let key = format!("key-{i}");
            let fp1 = fingerprint(key.as_bytes());
            let fp2 = fingerprint(key.as_bytes());
            assert!(equal(fp1, fp2));
        }
    }
}
