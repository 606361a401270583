//! In-memory store: presence, conversations and call sessions.
//!
//! Useful for tests, demos, and deployments where presence is fed by
//! configuration. Everything is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use switchboard_core::{
    AgentId, CallRegistry, ConversationStore, PresenceSource, RecentWindow, UpstreamError, load,
};

/// Call sessions silent for longer than this are reclaimed by default.
pub const DEFAULT_CALL_STALE_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Conversation {
    agent: AgentId,
    created_at: DateTime<Utc>,
    active: bool,
    last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CallSession {
    agent: AgentId,
    last_heartbeat: DateTime<Utc>,
    terminated_at: Option<DateTime<Utc>>,
}

pub struct InMemoryStore {
    online: RwLock<HashSet<AgentId>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    calls: RwLock<HashMap<Uuid, CallSession>>,
    stale_after: TimeDelta,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            online: RwLock::new(HashSet::new()),
            conversations: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
            stale_after: TimeDelta::seconds(DEFAULT_CALL_STALE_AFTER_SECS),
        }
    }

    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub async fn set_online(&self, agent: impl Into<AgentId>, online: bool) {
        let agent = agent.into();
        let mut set = self.online.write().await;
        if online {
            set.insert(agent);
        } else {
            set.remove(&agent);
        }
    }

    pub async fn online_count(&self) -> usize {
        self.online.read().await.len()
    }

    /// Open an active conversation handled by `agent`. No message yet.
    pub async fn open_conversation(&self, agent: impl Into<AgentId>, at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.conversations.write().await.insert(
            id,
            Conversation {
                agent: agent.into(),
                created_at: at,
                active: true,
                last_message_at: None,
            },
        );
        id
    }

    /// Record a message. Returns false for an unknown conversation.
    pub async fn post_message(&self, conversation: Uuid, at: DateTime<Utc>) -> bool {
        match self.conversations.write().await.get_mut(&conversation) {
            Some(c) => {
                c.last_message_at = Some(c.last_message_at.map_or(at, |prev| prev.max(at)));
                true
            }
            None => false,
        }
    }

    pub async fn close_conversation(&self, conversation: Uuid) -> bool {
        match self.conversations.write().await.get_mut(&conversation) {
            Some(c) => {
                c.active = false;
                true
            }
            None => false,
        }
    }

    pub async fn join_call(&self, agent: impl Into<AgentId>, at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.calls.write().await.insert(
            id,
            CallSession {
                agent: agent.into(),
                last_heartbeat: at,
                terminated_at: None,
            },
        );
        id
    }

    /// Keep a call session alive. Terminated sessions stay terminated.
    pub async fn heartbeat_call(&self, session: Uuid, at: DateTime<Utc>) -> bool {
        match self.calls.write().await.get_mut(&session) {
            Some(call) if call.terminated_at.is_none() => {
                call.last_heartbeat = at;
                true
            }
            _ => false,
        }
    }

    pub async fn leave_call(&self, session: Uuid, at: DateTime<Utc>) -> bool {
        match self.calls.write().await.get_mut(&session) {
            Some(call) if call.terminated_at.is_none() => {
                call.terminated_at = Some(at);
                true
            }
            _ => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceSource for InMemoryStore {
    async fn online(&self, agents: &[AgentId]) -> Result<HashSet<AgentId>, UpstreamError> {
        let online = self.online.read().await;
        Ok(agents
            .iter()
            .filter(|id| online.contains(*id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn count_active_recent(
        &self,
        agents: &[AgentId],
        window: &RecentWindow,
        now: DateTime<Utc>,
    ) -> Result<HashMap<AgentId, u32>, UpstreamError> {
        let wanted: HashSet<&AgentId> = agents.iter().collect();
        let conversations = self.conversations.read().await;

        let mut counts: HashMap<AgentId, u32> = HashMap::new();
        for c in conversations.values() {
            if wanted.contains(&c.agent)
                && window.counts(c.created_at, c.active, c.last_message_at, now)
            {
                *counts.entry(c.agent.clone()).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl CallRegistry for InMemoryStore {
    async fn in_call(&self, agents: &[AgentId]) -> Result<HashMap<AgentId, bool>, UpstreamError> {
        let wanted: HashSet<&AgentId> = agents.iter().collect();
        let calls = self.calls.read().await;
        Ok(calls
            .values()
            .filter(|call| call.terminated_at.is_none() && wanted.contains(&call.agent))
            .map(|call| (call.agent.clone(), true))
            .collect())
    }

    async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<usize, UpstreamError> {
        let cutoff = load::cutoff(now, self.stale_after);
        let mut calls = self.calls.write().await;
        let mut reclaimed = 0;
        for call in calls.values_mut() {
            if call.terminated_at.is_none() && call.last_heartbeat < cutoff {
                call.terminated_at = Some(now);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ids(raw: &[&str]) -> Vec<AgentId> {
        raw.iter().map(|id| AgentId::from(*id)).collect()
    }

    #[tokio::test]
    async fn presence_reflects_set_online() {
        let store = InMemoryStore::new();
        store.set_online("alice", true).await;
        store.set_online("bruno", true).await;
        store.set_online("bruno", false).await;

        let online = store.online(&ids(&["alice", "bruno", "chloe"])).await.unwrap();
        assert_eq!(online.len(), 1);
        assert!(online.contains(&AgentId::from("alice")));
    }

    #[tokio::test]
    async fn recent_count_applies_window() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let fresh = store.open_conversation("alice", now - TimeDelta::hours(1)).await;
        store.post_message(fresh, now - TimeDelta::minutes(29)).await;

        let quiet = store.open_conversation("alice", now - TimeDelta::hours(1)).await;
        store.post_message(quiet, now - TimeDelta::minutes(31)).await;

        let old = store.open_conversation("alice", now - TimeDelta::hours(25)).await;
        store.post_message(old, now - TimeDelta::minutes(1)).await;

        let closed = store.open_conversation("alice", now - TimeDelta::hours(1)).await;
        store.post_message(closed, now - TimeDelta::minutes(1)).await;
        store.close_conversation(closed).await;

        store.open_conversation("alice", now - TimeDelta::minutes(5)).await;

        let counts = store
            .count_active_recent(&ids(&["alice"]), &RecentWindow::default(), now)
            .await
            .unwrap();
        assert_eq!(counts.get(&AgentId::from("alice")), Some(&1));
    }

    #[tokio::test]
    async fn counts_only_requested_agents() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let c = store.open_conversation("bruno", now).await;
        store.post_message(c, now).await;

        let counts = store
            .count_active_recent(&ids(&["alice"]), &RecentWindow::default(), now)
            .await
            .unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn call_lifecycle() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let call = store.join_call("alice", now).await;

        let flags = store.in_call(&ids(&["alice", "bruno"])).await.unwrap();
        assert_eq!(flags.get(&AgentId::from("alice")), Some(&true));
        assert!(!flags.contains_key(&AgentId::from("bruno")));

        assert!(store.leave_call(call, now).await);
        assert!(!store.leave_call(call, now).await);
        assert!(store.in_call(&ids(&["alice"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reclaim_is_idempotent() {
        let store = InMemoryStore::new().with_stale_after(TimeDelta::seconds(60));
        let now = Utc::now();
        let stale = store.join_call("alice", now - TimeDelta::minutes(5)).await;
        let live = store.join_call("bruno", now - TimeDelta::minutes(5)).await;
        store.heartbeat_call(live, now - TimeDelta::seconds(10)).await;

        assert_eq!(store.reclaim_stale(now).await.unwrap(), 1);
        assert_eq!(store.reclaim_stale(now).await.unwrap(), 0);
        assert!(!store.heartbeat_call(stale, now).await);

        let flags = store.in_call(&ids(&["alice", "bruno"])).await.unwrap();
        assert_eq!(flags.len(), 1);
        assert!(flags.contains_key(&AgentId::from("bruno")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reclaims_terminate_each_call_once() {
        let store = Arc::new(InMemoryStore::new().with_stale_after(TimeDelta::seconds(60)));
        let now = Utc::now();
        for agent in ["alice", "bruno", "chloe", "dmitri", "eve"] {
            store.join_call(agent, now - TimeDelta::minutes(5)).await;
        }
        store.join_call("fatou", now).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reclaim_stale(now).await.unwrap() })
            })
            .collect();
        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }

        assert_eq!(total, 5);
        assert_eq!(store.in_call(&ids(&["fatou"])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unbounded_stale_window_reclaims_nothing() {
        let store = InMemoryStore::new().with_stale_after(TimeDelta::MAX);
        let now = Utc::now();
        store.join_call("alice", now - TimeDelta::days(30)).await;

        assert_eq!(store.reclaim_stale(now).await.unwrap(), 0);
    }
}
