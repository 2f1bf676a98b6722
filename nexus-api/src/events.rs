//! Registry lifecycle events and the broadcast bus.
//!
//! Events are produced by the agent service and the health prober, and
//! consumed by the webhook dispatcher. Delivery is fan-out over a tokio
//! broadcast channel; a slow consumer lags and drops rather than applying
//! backpressure to request handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default bus capacity before lagging consumers start losing events.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// A lifecycle event, as fanned out to webhook subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEvent {
    AgentRegistered {
        agent_uri: String,
        threat_score: u8,
    },
    AgentActivated {
        agent_uri: String,
        cert_serial: String,
        trust_tier: String,
    },
    AgentSuspended {
        agent_uri: String,
    },
    AgentRestored {
        agent_uri: String,
    },
    AgentDeprecated {
        agent_uri: String,
        sunset_date: Option<DateTime<Utc>>,
        replacement_uri: Option<String>,
    },
    AgentRevoked {
        agent_uri: String,
        reason: String,
    },
    AgentDeleted {
        agent_uri: String,
    },
    HealthDegraded {
        agent_uri: String,
        consecutive_failures: u32,
    },
    HealthRecovered {
        agent_uri: String,
    },
}

impl RegistryEvent {
    /// Wire event type, as matched by webhook subscriptions and sent in
    /// the delivery body's `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::AgentRegistered { .. } => "agent.registered",
            RegistryEvent::AgentActivated { .. } => "agent.activated",
            RegistryEvent::AgentSuspended { .. } => "agent.suspended",
            RegistryEvent::AgentRestored { .. } => "agent.restored",
            RegistryEvent::AgentDeprecated { .. } => "agent.deprecated",
            RegistryEvent::AgentRevoked { .. } => "agent.revoked",
            RegistryEvent::AgentDeleted { .. } => "agent.deleted",
            RegistryEvent::HealthDegraded { .. } => "agent.health_degraded",
            RegistryEvent::HealthRecovered { .. } => "agent.health_recovered",
        }
    }

    /// The URI of the agent the event concerns.
    pub fn agent_uri(&self) -> &str {
        match self {
            RegistryEvent::AgentRegistered { agent_uri, .. }
            | RegistryEvent::AgentActivated { agent_uri, .. }
            | RegistryEvent::AgentSuspended { agent_uri }
            | RegistryEvent::AgentRestored { agent_uri }
            | RegistryEvent::AgentDeprecated { agent_uri, .. }
            | RegistryEvent::AgentRevoked { agent_uri, .. }
            | RegistryEvent::AgentDeleted { agent_uri }
            | RegistryEvent::HealthDegraded { agent_uri, .. }
            | RegistryEvent::HealthRecovered { agent_uri } => agent_uri,
        }
    }

    /// Event-specific payload object for the webhook body, without the
    /// internal enum tag.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("kind");
        }
        value
    }
}

/// Broadcast bus shared by producers and the dispatcher.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Publish an event. Events with no subscriber are dropped silently;
    /// the ledger, not the bus, is the durable record.
    pub fn publish(&self, event: RegistryEvent) {
        let event_type = event.event_type();
        if self.sender.send(event).is_err() {
            tracing::debug!(event_type, "No event subscribers; event dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
