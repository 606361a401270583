//! Load sources: recent conversations and live calls per agent.
//!
//! Both traits are aggregate queries over stores owned by other
//! subsystems. Implementations must treat every call as potentially slow.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;

use crate::error::UpstreamError;
use crate::ids::AgentId;

/// The rolling windows defining a "recent" conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentWindow {
    /// Conversations created longer ago than this never count
    pub created_within: TimeDelta,
    /// The last message must be newer than this
    pub message_within: TimeDelta,
}

impl Default for RecentWindow {
    fn default() -> Self {
        Self {
            created_within: TimeDelta::hours(24),
            message_within: TimeDelta::minutes(30),
        }
    }
}

impl RecentWindow {
    pub fn new(created_within: TimeDelta, message_within: TimeDelta) -> Self {
        Self {
            created_within,
            message_within,
        }
    }

    pub fn created_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        cutoff(now, self.created_within)
    }

    pub fn message_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        cutoff(now, self.message_within)
    }

    /// Whether a conversation counts toward its agent's recent load.
    pub fn counts(
        &self,
        created_at: DateTime<Utc>,
        active: bool,
        last_message_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        active
            && created_at > self.created_after(now)
            && last_message_at.is_some_and(|at| at > self.message_after(now))
    }
}

/// `now - window`, clamped to the earliest representable instant.
pub fn cutoff(now: DateTime<Utc>, window: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Aggregate view over the conversation store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Number of recent active conversations per agent. Agents with none
    /// may be absent from the map.
    async fn count_active_recent(
        &self,
        agents: &[AgentId],
        window: &RecentWindow,
        now: DateTime<Utc>,
    ) -> Result<HashMap<AgentId, u32>, UpstreamError>;
}

/// Aggregate view over the call subsystem.
#[async_trait]
pub trait CallRegistry: Send + Sync {
    /// Whether each agent has at least one non-terminated call session.
    /// Agents not in a call may be absent from the map.
    async fn in_call(&self, agents: &[AgentId]) -> Result<HashMap<AgentId, bool>, UpstreamError>;

    /// Terminate call sessions that stopped reporting. Idempotent; returns
    /// how many sessions were terminated by this call.
    async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<usize, UpstreamError>;
}
