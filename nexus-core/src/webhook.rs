//! Webhook subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event-type pattern a subscription listens for. `*` matches everything.
pub const WEBHOOK_EVENT_WILDCARD: &str = "*";

/// A persisted webhook subscription.
///
/// The secret is write-once: it is returned to the creator exactly once
/// and never serialized into later responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WebhookSubscription {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub owner_user_id: Uuid,
    /// Delivery target URL.
    pub url: String,
    /// Event type strings (e.g. `agent.revoked`), or `*`.
    pub events: Vec<String>,
    /// HMAC-SHA-256 signing secret.
    #[serde(skip_serializing)]
    pub secret: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Whether this subscription wants `event_type`.
    pub fn matches(&self, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e == WEBHOOK_EVENT_WILDCARD || e == event_type)
    }
}

/// Outcome of one delivery attempt sequence, recorded after the final
/// attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub subscription_id: Uuid,
    pub event_type: String,
    pub success: bool,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}
