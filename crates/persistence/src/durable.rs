//! `ScyllaDurableStore` — the authoritative session/transcript repository.

use crate::error::PersistenceError;
use agentcore_core::{
    DurableStore, Fingerprint, ListFilters, Owner, Pagination, Session, SessionMode,
    SessionStatus, TranscriptEntry, TranscriptRole,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::frame::value::CqlTimestamp;
use scylla::transport::session::Session as ScyllaSession;
use scylla::IntoTypedRows;
use std::sync::Arc;
use uuid::Uuid;

pub struct ScyllaDurableStore {
    session: Arc<ScyllaSession>,
    keyspace: String,
}

impl ScyllaDurableStore {
    pub fn new(session: Arc<ScyllaSession>, keyspace: String) -> Self {
        Self { session, keyspace }
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{name}", self.keyspace)
    }
}

fn to_cql_timestamp(t: DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(t.timestamp_millis())
}

fn mode_str(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Brainstorm => "brainstorm",
        SessionMode::Code => "code",
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Error => "error",
    }
}

fn parse_mode(s: &str) -> Result<SessionMode, PersistenceError> {
    match s {
        "brainstorm" => Ok(SessionMode::Brainstorm),
        "code" => Ok(SessionMode::Code),
        other => Err(PersistenceError::Deserialize(format!("unknown mode {other}"))),
    }
}

fn parse_status(s: &str) -> Result<SessionStatus, PersistenceError> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "completed" => Ok(SessionStatus::Completed),
        "error" => Ok(SessionStatus::Error),
        other => Err(PersistenceError::Deserialize(format!("unknown status {other}"))),
    }
}

fn role_str(role: TranscriptRole) -> &'static str {
    match role {
        TranscriptRole::User => "user",
        TranscriptRole::Assistant => "assistant",
        TranscriptRole::Tool => "tool",
        TranscriptRole::System => "system",
    }
}

fn parse_role(s: &str) -> Result<TranscriptRole, PersistenceError> {
    match s {
        "user" => Ok(TranscriptRole::User),
        "assistant" => Ok(TranscriptRole::Assistant),
        "tool" => Ok(TranscriptRole::Tool),
        "system" => Ok(TranscriptRole::System),
        other => Err(PersistenceError::Deserialize(format!("unknown role {other}"))),
    }
}

#[async_trait]
impl DurableStore for ScyllaDurableStore {
    async fn create_session(&self, session: &Session) -> agentcore_core::Result<()> {
        let owner_fp = session
            .owner_fingerprint()
            .map(|fp| fp.to_hex())
            .unwrap_or_default();
        let metadata_json = serde_json::to_string(&session.metadata)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

        // Lightweight transaction: SCyllaDB has no multi-table ACID
        // transaction, so uniqueness is enforced with a conditional insert
        // (IF NOT EXISTS) on the primary table; the owner index is written
        // best-effort right after.
        let stmt = format!(
            "INSERT INTO {} (session_id, mode, status, owner_fingerprint, parent_id, model, \
             total_turns, total_cost_micros, created_at, updated_at, last_message_at, \
             session_metadata, tags, title) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?) IF NOT EXISTS",
            self.table("sessions")
        );
        let result = self
            .session
            .query(
                stmt,
                (
                    session.id,
                    mode_str(session.mode),
                    status_str(session.status),
                    owner_fp.clone(),
                    session.parent_id,
                    session.model.clone(),
                    session.total_turns as i32,
                    session.total_cost_micros as i64,
                    to_cql_timestamp(session.created_at),
                    to_cql_timestamp(session.updated_at),
                    session.last_message_at.map(to_cql_timestamp),
                    metadata_json,
                    session.tags.clone(),
                    session.title.clone(),
                ),
            )
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;

        let applied = result
            .single_row_typed::<(bool,)>()
            .map(|(applied,)| applied)
            .unwrap_or(true);
        if !applied {
            return Err(PersistenceError::AlreadyExists.into());
        }

        if let Owner::Owned(fp) = session.owner {
            let _ = self.write_owner_index(fp, session).await;
        }
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> agentcore_core::Result<Option<Session>> {
        let stmt = format!(
            "SELECT session_id, mode, status, owner_fingerprint, parent_id, model, \
             total_turns, total_cost_micros, created_at, updated_at, last_message_at, \
             session_metadata, tags, title FROM {} WHERE session_id = ?",
            self.table("sessions")
        );
        let result = self
            .session
            .query(stmt, (id,))
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;

        let rows = match result.rows {
            Some(rows) => rows,
            None => return Ok(None),
        };

        for row in rows.into_typed::<(
            Uuid,
            String,
            String,
            String,
            Option<Uuid>,
            String,
            i32,
            i64,
            CqlTimestamp,
            CqlTimestamp,
            Option<CqlTimestamp>,
            String,
            Vec<String>,
            Option<String>,
        )>() {
            let (
                session_id,
                mode,
                status,
                owner_fp,
                parent_id,
                model,
                total_turns,
                total_cost_micros,
                created_at,
                updated_at,
                last_message_at,
                metadata_json,
                tags,
                title,
            ) = row.map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

            let owner = if owner_fp.is_empty() {
                Owner::Public
            } else {
                let fp = Fingerprint::from_hex(&owner_fp)
                    .ok_or_else(|| PersistenceError::Deserialize("bad owner_fingerprint hex".into()))?;
                Owner::Owned(fp)
            };

            let metadata = serde_json::from_str(&metadata_json)
                .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

            return Ok(Some(Session {
                id: session_id,
                mode: parse_mode(&mode)?,
                status: parse_status(&status)?,
                owner,
                parent_id,
                model,
                total_turns: total_turns as u32,
                total_cost_micros: total_cost_micros as u64,
                created_at: millis_to_datetime(created_at),
                updated_at: millis_to_datetime(updated_at),
                last_message_at: last_message_at.map(millis_to_datetime),
                metadata,
                tags,
                title,
            }));
        }
        Ok(None)
    }

    async fn update_session(&self, updated: &Session) -> agentcore_core::Result<()> {
        let metadata_json = serde_json::to_string(&updated.metadata)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
        let stmt = format!(
            "UPDATE {} SET status=?, total_turns=?, total_cost_micros=?, updated_at=?, \
             last_message_at=?, session_metadata=?, tags=?, title=? WHERE session_id=?",
            self.table("sessions")
        );
        self.session
            .query(
                stmt,
                (
                    status_str(updated.status),
                    updated.total_turns as i32,
                    updated.total_cost_micros as i64,
                    to_cql_timestamp(updated.updated_at),
                    updated.last_message_at.map(to_cql_timestamp),
                    metadata_json,
                    updated.tags.clone(),
                    updated.title.clone(),
                    updated.id,
                ),
            )
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;

        if let Owner::Owned(fp) = updated.owner {
            let _ = self.write_owner_index(fp, updated).await;
        }
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> agentcore_core::Result<()> {
        let stmt = format!("DELETE FROM {} WHERE session_id = ?", self.table("sessions"));
        self.session
            .query(stmt, (id,))
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;
        let stmt = format!("DELETE FROM {} WHERE session_id = ?", self.table("transcripts"));
        self.session
            .query(stmt, (id,))
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;
        Ok(())
    }

    async fn append_transcript_entry(&self, entry: &TranscriptEntry) -> agentcore_core::Result<()> {
        let content_json = serde_json::to_string(&entry.content)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
        let stmt = format!(
            "INSERT INTO {} (session_id, seq, role, content, created_at) VALUES (?,?,?,?,?)",
            self.table("transcripts")
        );
        self.session
            .query(
                stmt,
                (
                    entry.session_id,
                    entry.seq as i32,
                    role_str(entry.role),
                    content_json,
                    to_cql_timestamp(entry.created_at),
                ),
            )
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;
        Ok(())
    }

    async fn list_transcript(&self, session_id: Uuid) -> agentcore_core::Result<Vec<TranscriptEntry>> {
        let stmt = format!(
            "SELECT session_id, seq, role, content, created_at FROM {} WHERE session_id = ? ORDER BY seq ASC",
            self.table("transcripts")
        );
        let result = self
            .session
            .query(stmt, (session_id,))
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows.into_typed::<(Uuid, i32, String, String, CqlTimestamp)>() {
                let (sid, seq, role, content_json, created_at) =
                    row.map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
                let content = serde_json::from_str(&content_json)
                    .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
                entries.push(TranscriptEntry {
                    session_id: sid,
                    seq: seq as u32,
                    role: parse_role(&role)?,
                    content,
                    created_at: millis_to_datetime(created_at),
                });
            }
        }
        Ok(entries)
    }

    async fn list_by_owner(
        &self,
        owner_fp: Fingerprint,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> agentcore_core::Result<(Vec<Session>, u64)> {
        // `mode`/`status` live on the `sessions_by_owner` index row itself,
        // so those two predicates are pushed into the CQL `WHERE` clause,
        // scoped to this owner's partition via `ALLOW FILTERING`.
        // `project_id`/`tag_contains`/`text_search`/`metadata_predicate`
        // read fields (session_metadata, tags, title) that only live on the
        // full session row, not the index row, and the metadata column is
        // an opaque JSON blob with no secondary index — Scylla has no way
        // to filter on it server-side. Those four are evaluated here, but
        // BEFORE pagination: the full owner-scoped (and mode/status
        // pre-filtered) row set is fetched and run through
        // `passes_secondary_filters` first, and only the resulting matched
        // set is paginated, with `total` taken from its length. This keeps
        // the "concatenating pages yields the owner-visible set exactly
        // once" property intact even though four predicates can't be
        // pushed all the way into the query layer.
        let mut where_clauses = vec!["owner_fingerprint = ?".to_string()];
        if let Some(mode) = filters.mode {
            where_clauses.push(format!("mode = '{}'", mode_str(mode)));
        }
        if let Some(status) = filters.status {
            let s = match status {
                agentcore_core::StatusFilter::Active => "active",
                agentcore_core::StatusFilter::Completed => "completed",
                agentcore_core::StatusFilter::Error => "error",
            };
            where_clauses.push(format!("status = '{s}'"));
        }
        let where_sql = where_clauses.join(" AND ");

        let stmt = format!(
            "SELECT session_id FROM {} WHERE {where_sql} ALLOW FILTERING",
            self.table("sessions_by_owner")
        );
        let result = self
            .session
            .query(stmt, (owner_fp.to_hex(),))
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;

        let mut ids = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows.into_typed::<(Uuid,)>() {
                let (id,) = row.map_err(|e| PersistenceError::Deserialize(e.to_string()))?;
                ids.push(id);
            }
        }

        let mut matched = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get_session(id).await? {
                if passes_secondary_filters(&session, filters) {
                    matched.push(session);
                }
            }
        }

        let total = matched.len() as u64;
        let start = ((pagination.page - 1) * pagination.page_size) as usize;
        let end = (start + pagination.page_size as usize).min(matched.len());
        let sessions = if start < matched.len() {
            matched.drain(start..end).collect()
        } else {
            Vec::new()
        };
        Ok((sessions, total))
    }
}

impl ScyllaDurableStore {
    async fn write_owner_index(&self, owner_fp: Fingerprint, session: &Session) -> Result<(), PersistenceError> {
        let stmt = format!(
            "INSERT INTO {} (owner_fingerprint, last_message_at, created_at, session_id) VALUES (?,?,?,?)",
            self.table("sessions_by_owner")
        );
        self.session
            .query(
                stmt,
                (
                    owner_fp.to_hex(),
                    to_cql_timestamp(session.last_message_at.unwrap_or(session.created_at)),
                    to_cql_timestamp(session.created_at),
                    session.id,
                ),
            )
            .await
            .map_err(|e| PersistenceError::DurableConnection(e.to_string()))?;
        Ok(())
    }
}

fn passes_secondary_filters(session: &Session, filters: &ListFilters) -> bool {
    if let Some(project_id) = &filters.project_id {
        let matches = session
            .metadata
            .get("project_id")
            .and_then(|v| v.as_str())
            .map(|v| v == project_id)
            .unwrap_or(false);
        if !matches {
            return false;
        }
    }
    if let Some(tag) = &filters.tag_contains {
        if !session.tags.iter().any(|t| t.contains(tag.as_str())) {
            return false;
        }
    }
    if let Some(text) = &filters.text_search {
        let haystack = session.title.clone().unwrap_or_default();
        if !haystack.to_lowercase().contains(&text.to_lowercase()) {
            return false;
        }
    }
    if let Some((path, expected)) = &filters.metadata_predicate {
        if session.metadata.get(path) != Some(expected) {
            return false;
        }
    }
    true
}

fn millis_to_datetime(ts: CqlTimestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.0).unwrap_or_else(Utc::now)
}
