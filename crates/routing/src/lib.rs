//! # Switchboard Routing
//!
//! Decides where a new live-chat conversation goes: an automated script
//! (when a channel rule says so) or one of the channel's online agents.
//!
//! Components, leaves first:
//! - [`AvailabilityDirectory`]: online subset of a channel's pool
//! - [`LoadTracker`]: per-agent recent load and call status
//! - [`OperatorSelector`]: stickiness, affinity pipeline, fair tie-break
//! - [`RuleMatcher`]: ordered, country-tiered rule evaluation
//! - [`RoutingCoordinator`] + [`SessionInitializer`]: orchestration
//!
//! ```rust,ignore
//! let coordinator = RoutingCoordinator::new(collaborators, RoutingSettings::default());
//! let destination = coordinator.route(&RoutingRequest::new("website")).await?;
//! ```

pub mod availability;
pub mod coordinator;
pub mod load;
pub mod random;
pub mod rules;
pub mod selector;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use availability::{AvailabilityDirectory, OnlineLookup};
pub use coordinator::{Collaborators, RoutingCoordinator, RoutingSettings};
pub use load::{AgentLoad, LoadSnapshot, LoadTracker};
pub use random::{RandomSource, SeededRandom, ThreadRandom};
pub use rules::RuleMatcher;
pub use selector::{AffinityPipeline, AffinityStage, OperatorSelector, Selection, SelectionReason};
pub use session::SessionInitializer;
