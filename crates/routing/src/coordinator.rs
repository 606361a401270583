//! Routing coordinator: rules first, then agent selection.
//!
//! One `route` call is independent of every other: no snapshot is cached
//! across requests and nothing is locked. Two concurrent requests may
//! pick the same least-loaded agent.

use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use switchboard_config::{MAX_WINDOW_SECS, RoutingConfig};
use switchboard_core::{
    AgentId, CallRegistry, Channel, ChannelCatalog, ChannelId, ConversationStore, CountryCode,
    Destination, DomainEvent, Error, EventBus, PresenceSource, RecentWindow, Result,
    RoutingRequest, Rule, ScriptEngine, Session,
};

use crate::availability::AvailabilityDirectory;
use crate::load::LoadTracker;
use crate::random::RandomSource;
use crate::rules::RuleMatcher;
use crate::selector::{AffinityPipeline, OperatorSelector};
use crate::session::SessionInitializer;

/// Tuning knobs for a coordinator.
#[derive(Debug, Clone)]
pub struct RoutingSettings {
    pub window: RecentWindow,
    pub sticky_max_recent: u32,
    pub pipeline: AffinityPipeline,
    pub reclaim_interval: TimeDelta,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            window: RecentWindow::default(),
            sticky_max_recent: 2,
            pipeline: AffinityPipeline::default(),
            reclaim_interval: TimeDelta::seconds(60),
        }
    }
}

impl RoutingSettings {
    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        let bounded = |field: &str, secs: u64| {
            i64::try_from(secs)
                .ok()
                .filter(|_| secs <= MAX_WINDOW_SECS)
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(|| Error::Config {
                    message: format!("routing.{field} is out of range"),
                })
        };

        let created = bounded(
            "recent_created_hours",
            u64::from(config.recent_created_hours) * 3600,
        )?;
        let message = bounded(
            "recent_message_minutes",
            u64::from(config.recent_message_minutes) * 60,
        )?;
        let reclaim_interval = bounded("reclaim_interval_secs", config.reclaim_interval_secs)?;

        Ok(Self {
            window: RecentWindow::new(created, message),
            sticky_max_recent: config.sticky_max_recent,
            pipeline: AffinityPipeline::from_names(&config.affinity_order)?,
            reclaim_interval,
        })
    }
}

/// The external capabilities routing consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ChannelCatalog>,
    pub presence: Arc<dyn PresenceSource>,
    pub conversations: Arc<dyn ConversationStore>,
    pub calls: Arc<dyn CallRegistry>,
    pub scripts: Arc<dyn ScriptEngine>,
}

/// Decides where each new conversation goes.
pub struct RoutingCoordinator {
    catalog: Arc<dyn ChannelCatalog>,
    directory: AvailabilityDirectory,
    load: LoadTracker,
    selector: OperatorSelector,
    rules: RuleMatcher,
    sessions: SessionInitializer,
    events: Option<Arc<EventBus>>,
}

impl RoutingCoordinator {
    pub fn new(collaborators: Collaborators, settings: RoutingSettings) -> Self {
        let load = LoadTracker::new(
            collaborators.conversations,
            collaborators.calls,
            settings.window,
            settings.sticky_max_recent,
        )
        .with_reclaim_interval(settings.reclaim_interval);

        Self {
            catalog: collaborators.catalog,
            directory: AvailabilityDirectory::new(collaborators.presence),
            load,
            selector: OperatorSelector::new(settings.pipeline),
            rules: RuleMatcher::new(collaborators.scripts.clone()),
            sessions: SessionInitializer::new(collaborators.scripts),
            events: None,
        }
    }

    /// Use `random` to break ties between equally loaded agents.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.selector = OperatorSelector::new(self.selector.pipeline().clone()).with_random(random);
        self
    }

    /// Publish routing decisions on `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn channel(&self, id: &ChannelId) -> Result<Channel> {
        self.catalog
            .channel(id)
            .await?
            .ok_or_else(|| Error::ChannelNotFound(id.clone()))
    }

    /// The rule governing widget behavior for a visitor context.
    pub async fn match_rule(
        &self,
        channel_id: &ChannelId,
        url: Option<&str>,
        country: Option<&CountryCode>,
    ) -> Result<Option<Rule>> {
        let channel = self.channel(channel_id).await?;
        let lookup = self.directory.lookup(&channel);
        let rule = self
            .rules
            .match_rule(&channel, url, country, &lookup)
            .await
            .inspect_err(|e| self.upstream_failed(channel_id, e))?;

        if let Some(rule) = &rule {
            self.publish(DomainEvent::RuleMatched {
                channel: channel_id.clone(),
                sequence: rule.sequence,
                timestamp: Utc::now(),
            });
        }
        Ok(rule)
    }

    /// Where the conversation described by `req` should go.
    pub async fn route(&self, req: &RoutingRequest) -> Result<Destination> {
        let channel = self.channel(&req.channel_id).await?;
        self.decide(&channel, req).await
    }

    /// Route `req` and build the initial conversation state.
    ///
    /// Fails with [`Error::NoDestination`] when nobody can take it.
    pub async fn start_session(&self, req: &RoutingRequest) -> Result<Session> {
        let channel = self.channel(&req.channel_id).await?;
        let destination = self.decide(&channel, req).await?;
        self.sessions
            .initialize_session(&channel, &destination, req)
            .await
    }

    pub async fn reclaim_stale_call_sessions(&self) -> Result<usize> {
        let count = self.load.reclaim_stale_call_sessions().await?;
        if count > 0 {
            self.publish(DomainEvent::CallSessionsReclaimed {
                count,
                timestamp: Utc::now(),
            });
        }
        Ok(count)
    }

    async fn decide(&self, channel: &Channel, req: &RoutingRequest) -> Result<Destination> {
        let (destination, reason) = match self.evaluate(channel, req).await {
            Ok(decision) => decision,
            Err(e) => {
                if let Error::Upstream(upstream) = &e {
                    self.upstream_failed(&channel.id, upstream);
                }
                return Err(e);
            }
        };

        info!(
            channel = %channel.id,
            destination = %destination,
            reason = %reason,
            "Route decided"
        );
        self.publish(DomainEvent::RouteDecided {
            channel: channel.id.clone(),
            destination: destination.clone(),
            reason,
            timestamp: Utc::now(),
        });
        Ok(destination)
    }

    async fn evaluate(&self, channel: &Channel, req: &RoutingRequest) -> Result<(Destination, String)> {
        // Rule matching and selection share one presence read.
        let lookup = self.directory.lookup(channel);

        let rule = self
            .rules
            .match_rule(
                channel,
                req.visitor_url.as_deref(),
                req.visitor_country.as_ref(),
                &lookup,
            )
            .await?;
        if let Some(Rule {
            sequence,
            script: Some(script),
            ..
        }) = rule
        {
            return Ok((Destination::Script { script }, format!("rule:{sequence}")));
        }

        let online = lookup.agents().await?;
        if online.is_empty() {
            return Ok((Destination::Unavailable, "no_agents_online".into()));
        }

        let candidates: Vec<AgentId> = online.iter().map(|a| a.id.clone()).collect();
        let snapshot = self.load.snapshot(&candidates).await?;

        Ok(match self.selector.pick_operator(req, online, &snapshot) {
            Some(selection) => (
                Destination::Agent {
                    agent: selection.agent,
                },
                selection.reason.to_string(),
            ),
            None => (Destination::Unavailable, "no_candidate".into()),
        })
    }

    fn upstream_failed(&self, channel: &ChannelId, error: &impl std::fmt::Display) {
        warn!(channel = %channel, error = %error, "Upstream failure while routing");
        self.publish(DomainEvent::UpstreamFailed {
            channel: channel.clone(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
