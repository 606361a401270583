//! Presence: who is online right now.
//!
//! Presence detection lives outside Switchboard; routing only consumes it.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::UpstreamError;
use crate::ids::AgentId;

/// Batch presence lookup.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// The subset of `agents` currently reporting online presence.
    ///
    /// An unreachable source must return an error, never an empty set.
    async fn online(&self, agents: &[AgentId]) -> Result<HashSet<AgentId>, UpstreamError>;
}
