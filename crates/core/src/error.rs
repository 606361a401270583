//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Configuration-level problems with a single rule are recovered locally
//! (see [`RuleError`]); infrastructure problems ([`UpstreamError`]) are
//! always surfaced to the caller.

use crate::ids::{ChannelId, ScriptId};
use thiserror::Error;

/// The top-level error type for all Switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator failures ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Rule definition problems ---
    #[error("Invalid rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// A session was requested for a visitor with nowhere to go.
    #[error("No destination available for this conversation")]
    NoDestination,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream(UpstreamError::Unavailable { .. }))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The external collaborator an [`UpstreamError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Presence,
    Conversations,
    Calls,
    Scripts,
    Catalog,
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Upstream::Presence => "presence",
            Upstream::Conversations => "conversations",
            Upstream::Calls => "calls",
            Upstream::Scripts => "scripts",
            Upstream::Catalog => "catalog",
        };
        f.write_str(name)
    }
}

/// A collaborator could not answer.
///
/// Never folded into an "unavailable" routing outcome: an unreachable
/// presence source is operationally different from nobody being online.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("{upstream} source unreachable: {reason}")]
    Unavailable { upstream: Upstream, reason: String },

    #[error("{upstream} query failed: {reason}")]
    QueryFailed { upstream: Upstream, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl UpstreamError {
    pub fn unavailable(upstream: Upstream, reason: impl Into<String>) -> Self {
        UpstreamError::Unavailable {
            upstream,
            reason: reason.into(),
        }
    }

    pub fn query_failed(upstream: Upstream, reason: impl Into<String>) -> Self {
        UpstreamError::QueryFailed {
            upstream,
            reason: reason.into(),
        }
    }
}

/// A single rule is malformed. The rule is skipped; matching continues.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("rule #{sequence} has an invalid URL pattern '{pattern}': {reason}")]
    InvalidPattern {
        sequence: i32,
        pattern: String,
        reason: String,
    },

    #[error("rule #{sequence} references unknown script '{script}'")]
    DanglingScript { sequence: i32, script: ScriptId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_displays_source() {
        let err = Error::Upstream(UpstreamError::unavailable(
            Upstream::Presence,
            "connection refused",
        ));
        assert!(err.to_string().contains("presence"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn only_unreachable_upstreams_are_retryable() {
        assert!(Error::from(UpstreamError::unavailable(Upstream::Calls, "down")).is_retryable());
        assert!(!Error::from(UpstreamError::query_failed(Upstream::Calls, "bad sql")).is_retryable());
        assert!(!Error::NoDestination.is_retryable());
        assert!(!Error::ChannelNotFound(ChannelId::from("x")).is_retryable());
    }

    #[test]
    fn rule_error_names_the_rule() {
        let err = RuleError::DanglingScript {
            sequence: 10,
            script: ScriptId::from("welcome-bot"),
        };
        assert!(err.to_string().contains("#10"));
        assert!(err.to_string().contains("welcome-bot"));
    }
}
