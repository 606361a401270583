//! Channel catalog and script engine backed by the configuration file.

use async_trait::async_trait;
use std::collections::HashMap;

use switchboard_config::{AppConfig, ChannelConfig, RuleConfig};
use switchboard_core::channel::DEFAULT_ANONYMOUS_NAME;
use switchboard_core::{
    Agent, AgentId, Channel, ChannelCatalog, ChannelId, Error, Result, Rule, ScriptEngine,
    ScriptId, ScriptInfo, StepId, UpstreamError, WidgetAction,
};

/// Read-only channel and script definitions, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct ConfigCatalog {
    channels: HashMap<ChannelId, Channel>,
    scripts: HashMap<ScriptId, ScriptInfo>,
}

impl ConfigCatalog {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let agents: HashMap<&str, Agent> = config
            .agents
            .iter()
            .map(|a| {
                let mut agent = Agent::new(a.id.as_str(), a.name.as_str())
                    .with_languages(a.languages.iter().map(String::as_str))
                    .with_extra_languages(a.extra_languages.iter().map(String::as_str));
                if let Some(country) = &a.country {
                    agent = agent.with_country(country.as_str());
                }
                if let Some(alias) = &a.chat_alias {
                    agent = agent.with_chat_alias(alias.as_str());
                }
                (a.id.as_str(), agent)
            })
            .collect();

        let channels = config
            .channels
            .iter()
            .map(|c| channel_from_config(c, &agents).map(|ch| (ch.id.clone(), ch)))
            .collect::<Result<HashMap<_, _>>>()?;

        let scripts = config
            .scripts
            .iter()
            .map(|s| {
                let info = ScriptInfo {
                    id: ScriptId::from(s.id.as_str()),
                    title: s.title.clone(),
                    active: s.active,
                    steps: s.steps.iter().map(|step| StepId::from(step.as_str())).collect(),
                };
                (info.id.clone(), info)
            })
            .collect();

        Ok(Self { channels, scripts })
    }

    /// Channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }
}

fn channel_from_config(config: &ChannelConfig, agents: &HashMap<&str, Agent>) -> Result<Channel> {
    let pool = config
        .agents
        .iter()
        .map(|id| {
            agents.get(id.as_str()).cloned().ok_or_else(|| Error::Config {
                message: format!("channel '{}' references unknown agent '{id}'", config.id),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let rules = config
        .rules
        .iter()
        .map(|r| rule_from_config(&config.id, r))
        .collect::<Result<Vec<_>>>()?;

    let mut channel = Channel::new(config.id.as_str(), config.name.as_str())
        .with_pool(pool)
        .with_rules(rules);
    channel.anonymous_name = config
        .anonymous_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANONYMOUS_NAME.to_string());
    Ok(channel)
}

fn rule_from_config(channel: &str, config: &RuleConfig) -> Result<Rule> {
    let action = match config.action.as_deref() {
        None => WidgetAction::default(),
        Some(name) => parse_action(name).ok_or_else(|| Error::Config {
            message: format!(
                "channel '{channel}' rule #{}: unknown action '{name}'",
                config.sequence
            ),
        })?,
    };

    Ok(Rule {
        sequence: config.sequence,
        url_pattern: config
            .url_pattern
            .clone()
            .filter(|p| !p.trim().is_empty()),
        countries: config.countries.iter().map(|c| c.as_str().into()).collect(),
        script: config.script.as_deref().map(ScriptId::from),
        require_no_operator: config.require_no_operator,
        action,
        auto_popup_delay_secs: config.auto_popup_delay_secs,
        button_text: config.button_text.clone(),
    })
}

fn parse_action(name: &str) -> Option<WidgetAction> {
    match name {
        "display_button" => Some(WidgetAction::DisplayButton),
        "display_button_and_text" => Some(WidgetAction::DisplayButtonAndText),
        "auto_popup" => Some(WidgetAction::AutoPopup),
        "hide_button" => Some(WidgetAction::HideButton),
        _ => None,
    }
}

#[async_trait]
impl ChannelCatalog for ConfigCatalog {
    async fn channel(&self, id: &ChannelId) -> std::result::Result<Option<Channel>, UpstreamError> {
        Ok(self.channels.get(id).cloned())
    }
}

#[async_trait]
impl ScriptEngine for ConfigCatalog {
    async fn script(&self, id: &ScriptId) -> std::result::Result<Option<ScriptInfo>, UpstreamError> {
        Ok(self.scripts.get(id).cloned())
    }
}

/// Pool ids of every channel, for presence seeding and diagnostics.
pub fn all_pool_ids(catalog: &ConfigCatalog) -> Vec<AgentId> {
    let mut ids: Vec<AgentId> = catalog
        .channels
        .values()
        .flat_map(|c| c.pool_ids())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
