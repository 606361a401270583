//! In-process fakes for the routing collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use switchboard_core::{
    Agent, AgentId, CallRegistry, Channel, ChannelCatalog, ChannelId, ConversationStore,
    PresenceSource, RecentWindow, ScriptEngine, ScriptId, ScriptInfo, StepId, Upstream,
    UpstreamError,
};

pub fn agent(id: &str) -> Agent {
    Agent::new(id, id.to_uppercase())
}

pub fn ids(raw: &[&str]) -> Vec<AgentId> {
    raw.iter().map(|id| AgentId::from(*id)).collect()
}

pub fn script(id: &str, active: bool, steps: &[&str]) -> ScriptInfo {
    ScriptInfo {
        id: ScriptId::from(id),
        title: format!("{id} flow"),
        active,
        steps: steps.iter().map(|s| StepId::from(*s)).collect(),
    }
}

/// Presence with a fixed online set.
#[derive(Default)]
pub struct FakePresence {
    online: HashSet<AgentId>,
    unreachable: bool,
    calls: AtomicUsize,
}

impl FakePresence {
    pub fn online<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        Self {
            online: agents.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn nobody() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// How many times presence was queried.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceSource for FakePresence {
    async fn online(&self, agents: &[AgentId]) -> Result<HashSet<AgentId>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(UpstreamError::unavailable(Upstream::Presence, "bus down"));
        }
        Ok(agents
            .iter()
            .filter(|id| self.online.contains(*id))
            .cloned()
            .collect())
    }
}

/// Conversation store with precomputed recent counts.
#[derive(Default)]
pub struct FakeConversations {
    counts: HashMap<AgentId, u32>,
    unreachable: bool,
}

impl FakeConversations {
    pub fn with_counts(counts: &[(&str, u32)]) -> Self {
        Self {
            counts: counts
                .iter()
                .map(|(id, n)| (AgentId::from(*id), *n))
                .collect(),
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ConversationStore for FakeConversations {
    async fn count_active_recent(
        &self,
        agents: &[AgentId],
        _window: &RecentWindow,
        _now: DateTime<Utc>,
    ) -> Result<HashMap<AgentId, u32>, UpstreamError> {
        if self.unreachable {
            return Err(UpstreamError::unavailable(Upstream::Conversations, "db down"));
        }
        Ok(agents
            .iter()
            .filter_map(|id| self.counts.get(id).map(|n| (id.clone(), *n)))
            .collect())
    }
}

/// Call registry. Stale calls count as live until reclaimed.
#[derive(Default)]
pub struct FakeCalls {
    live: HashSet<AgentId>,
    stale: Mutex<HashSet<AgentId>>,
    reclaims: AtomicUsize,
    unreachable: bool,
}

impl FakeCalls {
    pub fn with_calls(agents: &[&str]) -> Self {
        Self {
            live: agents.iter().map(|id| AgentId::from(*id)).collect(),
            ..Self::default()
        }
    }

    pub fn with_stale_calls(agents: &[&str]) -> Self {
        Self {
            stale: Mutex::new(agents.iter().map(|id| AgentId::from(*id)).collect()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// How many reclaim passes ran.
    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallRegistry for FakeCalls {
    async fn in_call(&self, agents: &[AgentId]) -> Result<HashMap<AgentId, bool>, UpstreamError> {
        if self.unreachable {
            return Err(UpstreamError::unavailable(Upstream::Calls, "rtc down"));
        }
        let stale = self.stale.lock().unwrap();
        Ok(agents
            .iter()
            .filter(|id| self.live.contains(*id) || stale.contains(*id))
            .map(|id| (id.clone(), true))
            .collect())
    }

    async fn reclaim_stale(&self, _now: DateTime<Utc>) -> Result<usize, UpstreamError> {
        if self.unreachable {
            return Err(UpstreamError::unavailable(Upstream::Calls, "rtc down"));
        }
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        let mut stale = self.stale.lock().unwrap();
        let count = stale.len();
        stale.clear();
        Ok(count)
    }
}

#[derive(Default)]
pub struct FakeScripts {
    scripts: HashMap<ScriptId, ScriptInfo>,
    unreachable: bool,
}

impl FakeScripts {
    pub fn with(scripts: Vec<ScriptInfo>) -> Self {
        Self {
            scripts: scripts.into_iter().map(|s| (s.id.clone(), s)).collect(),
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ScriptEngine for FakeScripts {
    async fn script(&self, id: &ScriptId) -> Result<Option<ScriptInfo>, UpstreamError> {
        if self.unreachable {
            return Err(UpstreamError::unavailable(Upstream::Scripts, "engine down"));
        }
        Ok(self.scripts.get(id).cloned())
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    channels: HashMap<ChannelId, Channel>,
}

impl FakeCatalog {
    pub fn with(channels: Vec<Channel>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

#[async_trait]
impl ChannelCatalog for FakeCatalog {
    async fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, UpstreamError> {
        Ok(self.channels.get(id).cloned())
    }
}
