//! Channels: configured live-chat endpoints.
//!
//! A channel owns an ordered agent pool and an ordered rule set. Both are
//! managed by configuration and are read-only to routing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::UpstreamError;
use crate::ids::{AgentId, ChannelId};
use crate::rule::Rule;

/// Placeholder name for visitors who did not identify themselves.
pub const DEFAULT_ANONYMOUS_NAME: &str = "Visitor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,

    pub name: String,

    /// Name given to visitors who did not identify themselves
    #[serde(default = "default_anonymous_name")]
    pub anonymous_name: String,

    /// Configured agents, in configuration order
    #[serde(default)]
    pub pool: Vec<Agent>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_anonymous_name() -> String {
    DEFAULT_ANONYMOUS_NAME.into()
}

impl Channel {
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            anonymous_name: default_anonymous_name(),
            pool: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_pool(mut self, pool: Vec<Agent>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Identities of the configured pool, in order.
    pub fn pool_ids(&self) -> Vec<AgentId> {
        self.pool.iter().map(|a| a.id.clone()).collect()
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.pool.iter().find(|a| &a.id == id)
    }
}

/// Source of channel definitions.
#[async_trait]
pub trait ChannelCatalog: Send + Sync {
    /// Look up a channel. `Ok(None)` means it does not exist.
    async fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, UpstreamError>;
}
