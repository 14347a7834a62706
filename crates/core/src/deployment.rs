//! Deployment mode — an immutable boot-time policy, not an ambient flag
//! (§9 design notes, §4.2.3, §5).

use serde::{Deserialize, Serialize};

/// Governs how the Session Manager reacts to cache-store unavailability on
/// the lock acquisition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// A single process instance is serving all traffic; lock failures due
    /// to cache unavailability are tolerated and logged, proceeding without
    /// a lock.
    SingleInstance,
    /// Multiple instances share the same durable store; a lock failure due
    /// to cache unavailability is fatal (`UNAVAILABLE`) because skipping the
    /// lock could let two instances race on the same session.
    Distributed,
}

impl Default for DeploymentMode {
    fn default() -> Self {
        DeploymentMode::SingleInstance
    }
}
