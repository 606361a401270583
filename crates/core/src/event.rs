//! Domain events: routing decisions observable without coupling.
//!
//! The coordinator publishes an event for every decision it makes. Nothing
//! is required to listen; publishing with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::ids::ChannelId;
use crate::routing::Destination;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A visitor was given a destination
    RouteDecided {
        channel: ChannelId,
        destination: Destination,
        /// Why this destination was chosen (e.g. "sticky", "affinity:language")
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A channel rule matched a visitor context
    RuleMatched {
        channel: ChannelId,
        sequence: i32,
        timestamp: DateTime<Utc>,
    },

    /// Stale call sessions were terminated
    CallSessionsReclaimed {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator could not be reached while routing
    UpstreamFailed {
        channel: ChannelId,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::RouteDecided {
            channel: "support".into(),
            destination: Destination::agent("alice"),
            reason: "sticky".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::RouteDecided { destination, reason, .. } => {
                assert_eq!(destination, &Destination::agent("alice"));
                assert_eq!(reason, "sticky");
            }
            _ => panic!("Expected RouteDecided event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::CallSessionsReclaimed {
            count: 0,
            timestamp: Utc::now(),
        });
    }
}
