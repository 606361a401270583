//! The initial state of a freshly routed conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AgentId, ChannelId, CountryCode, LangCode, ScriptId, StepId, VisitorId};
use crate::routing::Destination;

/// Who a conversation member is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MemberIdentity {
    Agent(AgentId),
    Script(ScriptId),
    Visitor(VisitorId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub identity: MemberIdentity,

    /// Last time something interesting happened for this member
    pub last_interest_at: DateTime<Utc>,

    /// When the member dismissed the conversation from their sidebar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpinned_at: Option<DateTime<Utc>>,
}

impl Member {
    /// A conversation is pinned unless it was dismissed after the last
    /// interesting event.
    pub fn is_pinned(&self) -> bool {
        match self.unpinned_at {
            Some(unpinned) => self.last_interest_at > unpinned,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub channel_id: ChannelId,
    pub name: String,
    pub destination: Destination,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LangCode>,

    /// First step to play when the destination is a script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_step: Option<StepId>,
}

impl Session {
    pub fn member(&self, identity: &MemberIdentity) -> Option<&Member> {
        self.members.iter().find(|m| &m.identity == identity)
    }
}
