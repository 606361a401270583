//! SQLite store for conversations and call sessions.
//!
//! Two tables:
//! - `conversations`: one row per live-chat conversation, with its agent,
//!   active flag and last message time
//! - `call_sessions`: one row per agent call session, with heartbeat and
//!   termination time
//!
//! Timestamps are fixed-width RFC 3339 UTC text, so string comparison
//! orders them chronologically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use switchboard_core::{
    AgentId, CallRegistry, ConversationStore, RecentWindow, Upstream, UpstreamError, load,
};

use crate::in_memory::DEFAULT_CALL_STALE_AFTER_SECS;

pub struct SqliteStore {
    pool: SqlitePool,
    stale_after: TimeDelta,
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversations_failed(e: sqlx::Error) -> UpstreamError {
    UpstreamError::query_failed(Upstream::Conversations, e.to_string())
}

fn calls_failed(e: sqlx::Error) -> UpstreamError {
    UpstreamError::query_failed(Upstream::Calls, e.to_string())
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, UpstreamError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| {
                UpstreamError::unavailable(Upstream::Conversations, format!("Invalid SQLite path: {e}"))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                UpstreamError::unavailable(Upstream::Conversations, format!("Failed to open SQLite: {e}"))
            })?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, UpstreamError> {
        let store = Self {
            pool,
            stale_after: TimeDelta::seconds(DEFAULT_CALL_STALE_AFTER_SECS),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    async fn run_migrations(&self) -> Result<(), UpstreamError> {
        let statements = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id              TEXT PRIMARY KEY,
                    agent_id        TEXT NOT NULL,
                    created_at      TEXT NOT NULL,
                    active          INTEGER NOT NULL DEFAULT 1,
                    last_message_at TEXT
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_agent_recent \
                 ON conversations(agent_id, active, created_at)",
            ),
            (
                "call_sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS call_sessions (
                    id             TEXT PRIMARY KEY,
                    agent_id       TEXT NOT NULL,
                    last_heartbeat TEXT NOT NULL,
                    terminated_at  TEXT
                )
                "#,
            ),
            (
                "call_sessions index",
                "CREATE INDEX IF NOT EXISTS idx_call_sessions_open \
                 ON call_sessions(terminated_at, agent_id)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| UpstreamError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    pub async fn open_conversation(
        &self,
        agent: &AgentId,
        at: DateTime<Utc>,
    ) -> Result<Uuid, UpstreamError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO conversations (id, agent_id, created_at, active) VALUES (?1, ?2, ?3, 1)")
            .bind(id.to_string())
            .bind(agent.as_str())
            .bind(ts(at))
            .execute(&self.pool)
            .await
            .map_err(conversations_failed)?;
        Ok(id)
    }

    /// Record a message. Returns false for an unknown conversation.
    pub async fn post_message(&self, conversation: Uuid, at: DateTime<Utc>) -> Result<bool, UpstreamError> {
        let result = sqlx::query(
            "UPDATE conversations SET last_message_at = MAX(COALESCE(last_message_at, ''), ?1) WHERE id = ?2",
        )
        .bind(ts(at))
        .bind(conversation.to_string())
        .execute(&self.pool)
        .await
        .map_err(conversations_failed)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn close_conversation(&self, conversation: Uuid) -> Result<bool, UpstreamError> {
        let result = sqlx::query("UPDATE conversations SET active = 0 WHERE id = ?1")
            .bind(conversation.to_string())
            .execute(&self.pool)
            .await
            .map_err(conversations_failed)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn join_call(&self, agent: &AgentId, at: DateTime<Utc>) -> Result<Uuid, UpstreamError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO call_sessions (id, agent_id, last_heartbeat) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(agent.as_str())
            .bind(ts(at))
            .execute(&self.pool)
            .await
            .map_err(calls_failed)?;
        Ok(id)
    }

    pub async fn heartbeat_call(&self, session: Uuid, at: DateTime<Utc>) -> Result<bool, UpstreamError> {
        let result = sqlx::query(
            "UPDATE call_sessions SET last_heartbeat = ?1 WHERE id = ?2 AND terminated_at IS NULL",
        )
        .bind(ts(at))
        .bind(session.to_string())
        .execute(&self.pool)
        .await
        .map_err(calls_failed)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn leave_call(&self, session: Uuid, at: DateTime<Utc>) -> Result<bool, UpstreamError> {
        let result = sqlx::query(
            "UPDATE call_sessions SET terminated_at = ?1 WHERE id = ?2 AND terminated_at IS NULL",
        )
        .bind(ts(at))
        .bind(session.to_string())
        .execute(&self.pool)
        .await
        .map_err(calls_failed)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Append `agent_id IN (?, ?, ...)` to `builder`.
fn push_agent_filter(builder: &mut QueryBuilder<'_, Sqlite>, agents: &[AgentId]) {
    builder.push("agent_id IN (");
    let mut list = builder.separated(", ");
    for agent in agents {
        list.push_bind(agent.as_str().to_owned());
    }
    list.push_unseparated(")");
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn count_active_recent(
        &self,
        agents: &[AgentId],
        window: &RecentWindow,
        now: DateTime<Utc>,
    ) -> Result<HashMap<AgentId, u32>, UpstreamError> {
        if agents.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT agent_id, COUNT(DISTINCT id) AS recent FROM conversations WHERE active = 1 AND created_at > ",
        );
        builder.push_bind(ts(window.created_after(now)));
        builder.push(" AND last_message_at > ");
        builder.push_bind(ts(window.message_after(now)));
        builder.push(" AND ");
        push_agent_filter(&mut builder, agents);
        builder.push(" GROUP BY agent_id");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(conversations_failed)?;

        rows.iter()
            .map(|row| {
                let agent: String = row.try_get("agent_id").map_err(conversations_failed)?;
                let recent: i64 = row.try_get("recent").map_err(conversations_failed)?;
                Ok((AgentId::new(agent), u32::try_from(recent).unwrap_or(u32::MAX)))
            })
            .collect()
    }
}

#[async_trait]
impl CallRegistry for SqliteStore {
    async fn in_call(&self, agents: &[AgentId]) -> Result<HashMap<AgentId, bool>, UpstreamError> {
        if agents.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT agent_id FROM call_sessions WHERE terminated_at IS NULL AND ",
        );
        push_agent_filter(&mut builder, agents);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(calls_failed)?;

        rows.iter()
            .map(|row| {
                let agent: String = row.try_get("agent_id").map_err(calls_failed)?;
                Ok((AgentId::new(agent), true))
            })
            .collect()
    }

    async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<usize, UpstreamError> {
        let result = sqlx::query(
            "UPDATE call_sessions SET terminated_at = ?1 WHERE terminated_at IS NULL AND last_heartbeat < ?2",
        )
        .bind(ts(now))
        .bind(ts(load::cutoff(now, self.stale_after)))
        .execute(&self.pool)
        .await
        .map_err(calls_failed)?;

        let reclaimed = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        if reclaimed > 0 {
            debug!(reclaimed, "Terminated stale call sessions");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<AgentId> {
        raw.iter().map(|id| AgentId::from(*id)).collect()
    }

    #[tokio::test]
    async fn counts_recent_active_conversations() {
        let db = test_store().await;
        let now = Utc::now();
        let alice = AgentId::from("alice");

        let fresh = db.open_conversation(&alice, now - TimeDelta::hours(2)).await.unwrap();
        db.post_message(fresh, now - TimeDelta::minutes(29)).await.unwrap();

        let quiet = db.open_conversation(&alice, now - TimeDelta::hours(2)).await.unwrap();
        db.post_message(quiet, now - TimeDelta::minutes(31)).await.unwrap();

        let old = db.open_conversation(&alice, now - TimeDelta::hours(30)).await.unwrap();
        db.post_message(old, now).await.unwrap();

        let closed = db.open_conversation(&alice, now - TimeDelta::hours(1)).await.unwrap();
        db.post_message(closed, now).await.unwrap();
        db.close_conversation(closed).await.unwrap();

        // Never received a message
        db.open_conversation(&alice, now).await.unwrap();

        let counts = db
            .count_active_recent(&ids(&["alice", "bruno"]), &RecentWindow::default(), now)
            .await
            .unwrap();
        assert_eq!(counts.get(&alice), Some(&1));
        assert!(!counts.contains_key(&AgentId::from("bruno")));
    }

    #[tokio::test]
    async fn later_message_wins() {
        let db = test_store().await;
        let now = Utc::now();
        let alice = AgentId::from("alice");
        let c = db.open_conversation(&alice, now - TimeDelta::hours(1)).await.unwrap();
        db.post_message(c, now - TimeDelta::minutes(5)).await.unwrap();
        db.post_message(c, now - TimeDelta::minutes(50)).await.unwrap();

        let counts = db
            .count_active_recent(&ids(&["alice"]), &RecentWindow::default(), now)
            .await
            .unwrap();
        assert_eq!(counts.get(&alice), Some(&1));
    }

    #[tokio::test]
    async fn empty_candidates_short_circuit() {
        let db = test_store().await;
        let counts = db
            .count_active_recent(&[], &RecentWindow::default(), Utc::now())
            .await
            .unwrap();
        assert!(counts.is_empty());
        assert!(db.in_call(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_call_and_reclaim() {
        let db = test_store().await.with_stale_after(TimeDelta::seconds(60));
        let now = Utc::now();
        let alice = AgentId::from("alice");
        let bruno = AgentId::from("bruno");

        db.join_call(&alice, now - TimeDelta::minutes(10)).await.unwrap();
        let live = db.join_call(&bruno, now - TimeDelta::minutes(10)).await.unwrap();
        db.heartbeat_call(live, now - TimeDelta::seconds(5)).await.unwrap();

        let before = db.in_call(&ids(&["alice", "bruno"])).await.unwrap();
        assert_eq!(before.len(), 2);

        assert_eq!(db.reclaim_stale(now).await.unwrap(), 1);
        assert_eq!(db.reclaim_stale(now).await.unwrap(), 0);

        let after = db.in_call(&ids(&["alice", "bruno"])).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after.contains_key(&bruno));

        assert!(db.leave_call(live, now).await.unwrap());
        assert!(!db.leave_call(live, now).await.unwrap());
        assert!(db.in_call(&ids(&["bruno"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unbounded_stale_window_reclaims_nothing() {
        let db = test_store().await.with_stale_after(TimeDelta::MAX);
        let now = Utc::now();
        db.join_call(&AgentId::from("alice"), now - TimeDelta::days(30))
            .await
            .unwrap();

        assert_eq!(db.reclaim_stale(now).await.unwrap(), 0);
        assert_eq!(db.in_call(&ids(&["alice"])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.db");
        let url = format!("sqlite://{}", path.display());
        let now = Utc::now();
        let alice = AgentId::from("alice");

        {
            let db = SqliteStore::new(&url).await.unwrap();
            let c = db.open_conversation(&alice, now).await.unwrap();
            db.post_message(c, now).await.unwrap();
        }

        let db = SqliteStore::new(&url).await.unwrap();
        let counts = db
            .count_active_recent(&ids(&["alice"]), &RecentWindow::default(), now)
            .await
            .unwrap();
        assert_eq!(counts.get(&alice), Some(&1));
    }
}
