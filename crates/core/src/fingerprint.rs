//! Caller fingerprint newtype.
//!
//! A `Fingerprint` is the only representation of tenant identity that is
//! allowed to cross a store, log, or memory-service boundary. The plaintext
//! API key never travels past the request that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte opaque, deterministic one-way transform of an API key.
///
/// Construct only through `agentcore_hashing::fingerprint`; this crate does
/// not itself know how to derive one, it only knows how to carry and compare
/// it, which keeps the hashing algorithm swappable without touching every
/// call site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(self) -> String {
        hex_encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex_decode(s)?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Who a session, or a memory record, belongs to.
///
/// Kept as a single tagged value rather than threading `Option<Fingerprint>`
/// sentinels through every call site — the one ownership-enforcement
/// function in `agentcore-sessions` is the only place that inspects this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fingerprint", rename_all = "snake_case")]
pub enum Owner {
    Owned(Fingerprint),
    /// Reserved for internal callers; never reachable through the public
    /// HTTP surface.
    Public,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let fp = Fingerprint([7u8; 32]);
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert_eq!(Fingerprint::from_hex("abcd"), None);
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert_eq!(Fingerprint::from_hex(&"zz".repeat(32)), None);
    }
}
