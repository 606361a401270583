//! Availability: the online subset of a channel's agent pool.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use switchboard_core::{Agent, AgentId, Channel, PresenceSource, UpstreamError};

/// Intersects a channel's configured pool with live presence.
pub struct AvailabilityDirectory {
    presence: Arc<dyn PresenceSource>,
}

impl AvailabilityDirectory {
    pub fn new(presence: Arc<dyn PresenceSource>) -> Self {
        Self { presence }
    }

    /// Online agents of `channel`, in pool order.
    ///
    /// An unreachable presence source is an error, distinct from an empty
    /// (reachable) result.
    pub async fn online_agents(&self, channel: &Channel) -> Result<Vec<Agent>, UpstreamError> {
        if channel.pool.is_empty() {
            return Ok(Vec::new());
        }

        let online = self.presence.online(&channel.pool_ids()).await?;
        let agents: Vec<Agent> = channel
            .pool
            .iter()
            .filter(|agent| online.contains(&agent.id))
            .cloned()
            .collect();

        debug!(
            channel = %channel.id,
            pool = channel.pool.len(),
            online = agents.len(),
            "Resolved online agents"
        );
        Ok(agents)
    }

    /// Identities of the online agents, in pool order.
    pub async fn online_ids(&self, channel: &Channel) -> Result<Vec<AgentId>, UpstreamError> {
        let agents = self.online_agents(channel).await?;
        Ok(agents.into_iter().map(|a| a.id).collect())
    }

    /// A lookup that reads presence for `channel` at most once.
    pub fn lookup<'a>(&'a self, channel: &'a Channel) -> OnlineLookup<'a> {
        OnlineLookup {
            directory: self,
            channel,
            online: OnceCell::new(),
        }
    }
}

/// Lazily fetched, memoized online set for one routing decision.
///
/// Rule matching (`require_no_operator`) and agent selection both look at
/// the online pool; sharing one read keeps them consistent with each other.
pub struct OnlineLookup<'a> {
    directory: &'a AvailabilityDirectory,
    channel: &'a Channel,
    online: OnceCell<Vec<Agent>>,
}

impl OnlineLookup<'_> {
    pub async fn agents(&self) -> Result<&[Agent], UpstreamError> {
        let agents = self
            .online
            .get_or_try_init(|| self.directory.online_agents(self.channel))
            .await?;
        Ok(agents.as_slice())
    }

    /// Whether presence has been read yet.
    pub fn is_resolved(&self) -> bool {
        self.online.initialized()
    }
}
