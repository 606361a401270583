//! # Switchboard Core
//!
//! Domain types, collaborator traits, and error definitions for live-chat
//! routing. This crate has **zero framework dependencies**: it defines the
//! model every other crate implements against.
//!
//! Routing consumes four external capabilities, each a trait here:
//! - [`PresenceSource`]: who is online
//! - [`ConversationStore`]: recent conversation counts per agent
//! - [`CallRegistry`]: who is in a call, and stale call cleanup
//! - [`ScriptEngine`]: automated flows
//!
//! plus [`ChannelCatalog`] for channel definitions. Implementations live in
//! `switchboard-store`; tests use in-process fakes.

pub mod agent;
pub mod channel;
pub mod error;
pub mod event;
pub mod ids;
pub mod load;
pub mod presence;
pub mod routing;
pub mod rule;
pub mod script;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use agent::Agent;
pub use channel::{Channel, ChannelCatalog};
pub use error::{Error, Result, RuleError, Upstream, UpstreamError};
pub use event::{DomainEvent, EventBus};
pub use ids::{AgentId, ChannelId, CountryCode, LangCode, ScriptId, StepId, VisitorId};
pub use load::{CallRegistry, ConversationStore, RecentWindow};
pub use presence::PresenceSource;
pub use routing::{Destination, RoutingRequest, Visitor};
pub use rule::{Rule, WidgetAction};
pub use script::{ScriptEngine, ScriptInfo};
pub use session::{Member, MemberIdentity, Session};
