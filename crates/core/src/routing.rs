//! Routing inputs and outcomes.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ChannelId, CountryCode, LangCode, ScriptId, VisitorId};

/// Where a new conversation goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    Agent { agent: AgentId },
    Script { script: ScriptId },
    /// Nobody can take the conversation; the widget must not offer chat.
    Unavailable,
}

impl Destination {
    pub fn agent(id: impl Into<AgentId>) -> Self {
        Destination::Agent { agent: id.into() }
    }

    pub fn script(id: impl Into<ScriptId>) -> Self {
        Destination::Script { script: id.into() }
    }

    pub fn accepts_chat(&self) -> bool {
        !matches!(self, Destination::Unavailable)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Agent { agent } => write!(f, "agent:{agent}"),
            Destination::Script { script } => write!(f, "script:{script}"),
            Destination::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// The visitor opening the chat, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: VisitorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One "start chat" attempt. Built once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub channel_id: ChannelId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_country: Option<CountryCode>,

    /// Agent who handled this visitor last time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_agent: Option<AgentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_lang: Option<LangCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor: Option<Visitor>,
}

impl RoutingRequest {
    pub fn new(channel_id: impl Into<ChannelId>) -> Self {
        Self {
            channel_id: channel_id.into(),
            visitor_url: None,
            visitor_country: None,
            previous_agent: None,
            preferred_lang: None,
            visitor: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.visitor_url = Some(url.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<CountryCode>) -> Self {
        self.visitor_country = Some(country.into());
        self
    }

    pub fn with_previous_agent(mut self, agent: impl Into<AgentId>) -> Self {
        self.previous_agent = Some(agent.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<LangCode>) -> Self {
        self.preferred_lang = Some(lang.into());
        self
    }

    pub fn with_visitor(mut self, id: impl Into<VisitorId>, display_name: Option<String>) -> Self {
        self.visitor = Some(Visitor {
            id: id.into(),
            display_name,
        });
        self
    }
}
