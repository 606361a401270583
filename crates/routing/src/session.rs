//! Session initialization: the first state of a routed conversation.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use switchboard_core::{
    Channel, Destination, Error, Member, MemberIdentity, Result, RoutingRequest, ScriptEngine,
    Session,
};

/// Seconds between the destination's last interest and its dismissal.
const DESTINATION_INTEREST_OFFSET_SECS: i64 = 30;

pub struct SessionInitializer {
    scripts: Arc<dyn ScriptEngine>,
}

impl SessionInitializer {
    pub fn new(scripts: Arc<dyn ScriptEngine>) -> Self {
        Self { scripts }
    }

    pub async fn initialize_session(
        &self,
        channel: &Channel,
        destination: &Destination,
        req: &RoutingRequest,
    ) -> Result<Session> {
        self.initialize_session_at(channel, destination, req, Utc::now())
            .await
    }

    /// Build the session as of `now`.
    ///
    /// The destination member starts unpinned: its last interest is set
    /// strictly before its dismissal, so the conversation does not pop up
    /// in the agent's sidebar until something happens in it. The visitor
    /// member starts pinned.
    pub async fn initialize_session_at(
        &self,
        channel: &Channel,
        destination: &Destination,
        req: &RoutingRequest,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let (identity, destination_name, welcome_step) = match destination {
            Destination::Unavailable => return Err(Error::NoDestination),
            Destination::Agent { agent } => {
                let name = channel
                    .agent(agent)
                    .map(|a| a.display_name().to_string())
                    .unwrap_or_else(|| agent.to_string());
                (MemberIdentity::Agent(agent.clone()), name, None)
            }
            Destination::Script { script } => {
                let info = self.scripts.script(script).await?.ok_or_else(|| {
                    Error::Internal(format!("script '{script}' disappeared after routing"))
                })?;
                let welcome = info.welcome_step().cloned();
                (MemberIdentity::Script(script.clone()), info.title, welcome)
            }
        };

        let mut members = vec![Member {
            identity,
            last_interest_at: now - TimeDelta::seconds(DESTINATION_INTEREST_OFFSET_SECS),
            unpinned_at: Some(now),
        }];

        let visitor_name = req
            .visitor
            .as_ref()
            .and_then(|v| v.display_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&channel.anonymous_name);

        if let Some(visitor) = &req.visitor {
            members.push(Member {
                identity: MemberIdentity::Visitor(visitor.id.clone()),
                last_interest_at: now,
                unpinned_at: None,
            });
        }

        let session = Session {
            id: Uuid::new_v4(),
            channel_id: channel.id.clone(),
            name: format!("{visitor_name} {destination_name}"),
            destination: destination.clone(),
            members,
            created_at: now,
            country: req.visitor_country.clone(),
            language: req.preferred_lang.clone(),
            welcome_step,
        };

        debug!(channel = %channel.id, session = %session.id, name = %session.name, "Session initialized");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeScripts, agent, script};
    use switchboard_core::{AgentId, ScriptId, StepId, VisitorId};

    fn initializer() -> SessionInitializer {
        SessionInitializer::new(Arc::new(FakeScripts::with(vec![script(
            "triage",
            true,
            &["greet", "ask"],
        )])))
    }

    fn channel() -> Channel {
        Channel::new("web", "Website").with_pool(vec![
            agent("alice").with_chat_alias("Ally"),
            agent("bruno"),
        ])
    }

    #[tokio::test]
    async fn agent_session_starts_unpinned_for_the_agent() {
        let now = Utc::now();
        let req = RoutingRequest::new("web").with_visitor("v1", Some("Dana".into()));
        let session = initializer()
            .initialize_session_at(&channel(), &Destination::agent("alice"), &req, now)
            .await
            .unwrap();

        let agent_member = session
            .member(&MemberIdentity::Agent(AgentId::from("alice")))
            .unwrap();
        assert!(agent_member.last_interest_at < agent_member.unpinned_at.unwrap());
        assert!(!agent_member.is_pinned());

        let visitor = session
            .member(&MemberIdentity::Visitor(VisitorId::from("v1")))
            .unwrap();
        assert!(visitor.is_pinned());

        assert_eq!(session.name, "Dana Ally");
        assert_eq!(session.created_at, now);
    }

    #[tokio::test]
    async fn anonymous_visitor_gets_channel_placeholder() {
        let mut channel = channel();
        channel.anonymous_name = "Guest".into();
        let req = RoutingRequest::new("web").with_visitor("v2", Some("   ".into()));
        let session = initializer()
            .initialize_session(&channel, &Destination::agent("bruno"), &req)
            .await
            .unwrap();
        assert_eq!(session.name, "Guest BRUNO");
        assert_eq!(session.members.len(), 2);
    }

    #[tokio::test]
    async fn session_without_visitor_has_only_destination() {
        let session = initializer()
            .initialize_session(&channel(), &Destination::agent("bruno"), &RoutingRequest::new("web"))
            .await
            .unwrap();
        assert_eq!(session.members.len(), 1);
        assert_eq!(session.name, "Visitor BRUNO");
    }

    #[tokio::test]
    async fn script_session_carries_welcome_step() {
        let req = RoutingRequest::new("web").with_country("be").with_lang("fr");
        let session = initializer()
            .initialize_session(&channel(), &Destination::script("triage"), &req)
            .await
            .unwrap();
        assert_eq!(session.welcome_step, Some(StepId::from("greet")));
        assert_eq!(session.name, "Visitor triage flow");
        assert!(
            session
                .member(&MemberIdentity::Script(ScriptId::from("triage")))
                .is_some()
        );
        assert_eq!(session.country.as_ref().map(|c| c.as_str()), Some("BE"));
    }

    #[tokio::test]
    async fn unavailable_destination_is_refused() {
        let result = initializer()
            .initialize_session(&channel(), &Destination::Unavailable, &RoutingRequest::new("web"))
            .await;
        assert!(matches!(result, Err(Error::NoDestination)));
    }

    #[tokio::test]
    async fn vanished_script_is_an_error() {
        let result = initializer()
            .initialize_session(&channel(), &Destination::script("gone"), &RoutingRequest::new("web"))
            .await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
