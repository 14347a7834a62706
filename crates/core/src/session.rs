//! Session and transcript domain types (§3.1, §3.2 of the design).

use crate::fingerprint::{Fingerprint, Owner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Brainstorm,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    /// Terminal statuses accept no further mutation except delete.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    /// Only active->active, active->completed, active->error are legal.
    pub fn can_transition_to(self, _next: SessionStatus) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub owner: Owner,
    pub parent_id: Option<Uuid>,
    pub model: String,
    pub total_turns: u32,
    /// Cost tracked in integer micro-currency units to avoid float drift;
    /// monotone non-decreasing per §3.1.
    pub total_cost_micros: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, Value>,
    pub tags: Vec<String>,
    pub title: Option<String>,
}

impl Session {
    pub fn owner_fingerprint(&self) -> Option<Fingerprint> {
        match self.owner {
            Owner::Owned(fp) => Some(fp),
            Owner::Public => None,
        }
    }

    /// `true` once `created_at ≤ updated_at` and (if set) `last_message_at ≤
    /// updated_at` hold — the invariant every mutator must preserve.
    pub fn timestamps_consistent(&self) -> bool {
        self.created_at <= self.updated_at
            && self
                .last_message_at
                .map(|t| t <= self.updated_at)
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    User,
    Assistant,
    Tool,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub session_id: Uuid,
    /// Dense, zero-based ordering within the session.
    pub seq: u32,
    pub role: TranscriptRole,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a new session; timestamps and id are
/// assigned by the Session Manager, not the caller.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub mode: SessionMode,
    pub model: String,
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub metadata: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_reach_any_state() {
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Active));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Error));
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Active));
        assert!(!SessionStatus::Error.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn is_terminal_matches_completed_and_error() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
    }
}
