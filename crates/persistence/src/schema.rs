//! CQL schema management for the durable store.

use scylla::Session as ScyllaSession;
use std::sync::Arc;

/// Creates the keyspace if absent, using the replication factor appropriate
/// for a single-DC development cluster. Production keyspaces are expected
/// to be provisioned out-of-band with a real replication strategy; this
/// call is idempotent either way.
pub async fn create_keyspace(
    session: &ScyllaSession,
    keyspace: &str,
) -> Result<(), scylla::transport::errors::QueryError> {
    let stmt = format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
         WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
    );
    session.query(stmt, &[]).await?;
    Ok(())
}

/// Creates the `sessions` and `transcripts` tables. Column name
/// `session_metadata` is canonical (§6.3) — never `metadata`.
pub async fn create_tables(
    session: &ScyllaSession,
    keyspace: &str,
) -> Result<(), scylla::transport::errors::QueryError> {
    session
        .query(
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.sessions (
                    session_id uuid PRIMARY KEY,
                    mode text,
                    status text,
                    owner_fingerprint text,
                    parent_id uuid,
                    model text,
                    total_turns int,
                    total_cost_micros bigint,
                    created_at timestamp,
                    updated_at timestamp,
                    last_message_at timestamp,
                    session_metadata text,
                    tags list<text>,
                    title text
                )"
            ),
            &[],
        )
        .await?;

    session
        .query(
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.transcripts (
                    session_id uuid,
                    seq int,
                    role text,
                    content text,
                    created_at timestamp,
                    PRIMARY KEY (session_id, seq)
                ) WITH CLUSTERING ORDER BY (seq ASC)"
            ),
            &[],
        )
        .await?;

    // Owner index backs List()'s durable-side filter; the cache owner-index
    // in Redis only ever accelerates this, it is never authoritative.
    session
        .query(
            format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.sessions_by_owner (
                    owner_fingerprint text,
                    last_message_at timestamp,
                    created_at timestamp,
                    session_id uuid,
                    PRIMARY KEY (owner_fingerprint, last_message_at, created_at, session_id)
                ) WITH CLUSTERING ORDER BY (last_message_at DESC, created_at DESC)"
            ),
            &[],
        )
        .await?;

    Ok(())
}

/// Convenience wrapper used at process start: ensure keyspace and tables
/// both exist before serving traffic.
pub async fn ensure_schema(
    session: &Arc<ScyllaSession>,
    keyspace: &str,
) -> Result<(), scylla::transport::errors::QueryError> {
    create_keyspace(session, keyspace).await?;
    create_tables(session, keyspace).await?;
    Ok(())
}
