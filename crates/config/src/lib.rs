//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Rule URL patterns and script references are deliberately *not* checked
//! here: a broken rule is skipped at match time without taking the rest of
//! the channel down.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Affinity stage names understood by the operator selector.
pub const AFFINITY_STAGES: [&str; 3] = ["language", "extra_language", "country"];

/// Upper bound for every routing window and interval (one leap year).
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 3600;

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation / call store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Routing algorithm tuning
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Static presence list (used by the in-memory presence source)
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Operator profiles
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Scripted-bot flows
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,

    /// Live-chat channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Requests per minute per client (0 disables rate limiting)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,
}

fn default_port() -> u16 {
    42700
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_rate_limit() -> usize {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database path for the sqlite backend (defaults to ~/.switchboard/switchboard.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The effective sqlite database path.
    pub fn database_path(&self) -> String {
        self.path.clone().unwrap_or_else(|| {
            AppConfig::config_dir()
                .join("switchboard.db")
                .display()
                .to_string()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Conversations older than this never count as recent load
    #[serde(default = "default_recent_created_hours")]
    pub recent_created_hours: u32,

    /// A conversation counts only if its last message is newer than this
    #[serde(default = "default_recent_message_minutes")]
    pub recent_message_minutes: u32,

    /// Agents with fewer recent conversations than this stay eligible
    /// for stickiness even while in a call
    #[serde(default = "default_sticky_max_recent")]
    pub sticky_max_recent: u32,

    /// Ordered affinity stages tried before plain least-loaded selection
    #[serde(default = "default_affinity_order")]
    pub affinity_order: Vec<String>,

    /// Minimum time between stale call reclaims (0 = before every snapshot)
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_secs: u64,

    /// Call sessions silent for longer than this are considered stale
    #[serde(default = "default_call_stale_after")]
    pub call_stale_after_secs: u64,
}

fn default_recent_created_hours() -> u32 {
    24
}
fn default_recent_message_minutes() -> u32 {
    30
}
fn default_sticky_max_recent() -> u32 {
    2
}
fn default_affinity_order() -> Vec<String> {
    AFFINITY_STAGES.iter().map(|s| s.to_string()).collect()
}
fn default_reclaim_interval() -> u64 {
    60
}
fn default_call_stale_after() -> u64 {
    60
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            recent_created_hours: default_recent_created_hours(),
            recent_message_minutes: default_recent_message_minutes(),
            sticky_max_recent: default_sticky_max_recent(),
            affinity_order: default_affinity_order(),
            reclaim_interval_secs: default_reclaim_interval(),
            call_stale_after_secs: default_call_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Agent ids reported online at startup
    #[serde(default)]
    pub online: Vec<String>,
}

/// An operator profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,

    pub name: String,

    /// Public name shown to visitors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_alias: Option<String>,

    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default)]
    pub extra_languages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// A scripted-bot flow as seen by routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub id: String,

    pub title: String,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Step ids in execution order
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,

    pub name: String,

    /// Name given to anonymous visitors (defaults to "Visitor")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_name: Option<String>,

    /// Agent ids in this channel's pool, in preference order
    #[serde(default)]
    pub agents: Vec<String>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub sequence: i32,

    /// Regex searched in the visitor URL; omit to match visitors without a URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    #[serde(default)]
    pub countries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    #[serde(default)]
    pub require_no_operator: bool,

    /// "display_button", "display_button_and_text", "auto_popup", "hide_button"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default)]
    pub auto_popup_delay_secs: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
}

/// Starter configuration written by `switchboard onboard`.
pub const SAMPLE_TOML: &str = r#"# Switchboard configuration

[gateway]
host = "127.0.0.1"
port = 42700

[store]
backend = "memory"

[routing]
recent_created_hours = 24
recent_message_minutes = 30
sticky_max_recent = 2
affinity_order = ["language", "extra_language", "country"]

[presence]
online = ["alice", "bruno"]

[[agents]]
id = "alice"
name = "Alice Martin"
chat_alias = "Alice"
languages = ["en_US"]
extra_languages = ["fr_FR"]
country = "US"

[[agents]]
id = "bruno"
name = "Bruno Dupont"
languages = ["fr_BE"]
country = "BE"

[[scripts]]
id = "after-hours"
title = "After Hours Bot"
steps = ["greeting", "ask-email"]

[[channels]]
id = "website"
name = "Website Support"
agents = ["alice", "bruno"]

# Hand visitors to the bot while nobody is online
[[channels.rules]]
sequence = 10
url_pattern = "/contact"
script = "after-hours"
require_no_operator = true

[[channels.rules]]
sequence = 20
url_pattern = "/pricing"
action = "auto_popup"
auto_popup_delay_secs = 5
"#;

impl AppConfig {
    /// Load configuration from the default path (~/.switchboard/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `SWITCHBOARD_HOST`, `SWITCHBOARD_PORT`
    /// - `SWITCHBOARD_STORE` (backend name)
    /// - `SWITCHBOARD_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("SWITCHBOARD_HOST") {
            self.gateway.host = host;
        }

        if let Ok(port) = std::env::var("SWITCHBOARD_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SWITCHBOARD_PORT is not a port: {port}"))
            })?;
        }

        if let Ok(backend) = std::env::var("SWITCHBOARD_STORE") {
            self.store.backend = backend;
        }

        if let Ok(path) = std::env::var("SWITCHBOARD_DB_PATH") {
            self.store.path = Some(path);
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchboard")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let routing = &self.routing;
        if routing.recent_created_hours == 0 || routing.recent_message_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "recent_created_hours and recent_message_minutes must be > 0".into(),
            ));
        }

        for (field, secs) in [
            ("recent_created_hours", u64::from(routing.recent_created_hours) * 3600),
            ("recent_message_minutes", u64::from(routing.recent_message_minutes) * 60),
            ("reclaim_interval_secs", routing.reclaim_interval_secs),
            ("call_stale_after_secs", routing.call_stale_after_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must not exceed {MAX_WINDOW_SECS} seconds"
                )));
            }
        }

        if routing.sticky_max_recent == 0 {
            return Err(ConfigError::ValidationError(
                "sticky_max_recent must be >= 1".into(),
            ));
        }

        let mut seen_stages = HashSet::new();
        for stage in &routing.affinity_order {
            if !AFFINITY_STAGES.contains(&stage.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "unknown affinity stage '{stage}' (expected one of {})",
                    AFFINITY_STAGES.join(", ")
                )));
            }
            if !seen_stages.insert(stage.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "affinity stage '{stage}' listed twice"
                )));
            }
        }

        if !matches!(self.store.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected memory or sqlite)",
                self.store.backend
            )));
        }

        let agent_ids = unique_ids("agent", self.agents.iter().map(|a| a.id.as_str()))?;
        unique_ids("script", self.scripts.iter().map(|s| s.id.as_str()))?;
        unique_ids("channel", self.channels.iter().map(|c| c.id.as_str()))?;

        for channel in &self.channels {
            if let Some(unknown) = channel
                .agents
                .iter()
                .find(|id| !agent_ids.contains(id.as_str()))
            {
                return Err(ConfigError::ValidationError(format!(
                    "channel '{}' references unknown agent '{unknown}'",
                    channel.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a channel definition by id.
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn unique_ids<'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{kind} id must not be empty")));
        }
        if !seen.insert(id) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate {kind} id '{id}'"
            )));
        }
    }
    Ok(seen)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
