//! Webhook subscription DTOs.

use nexus_core::WebhookSubscription;
use serde::{Deserialize, Serialize};

/// Body for creating a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateWebhookRequest {
    /// Delivery target; must be an absolute URL.
    pub url: String,
    /// Event types to subscribe to (e.g. `agent.revoked`), or `["*"]`.
    pub events: Vec<String>,
    /// Optional caller-chosen signing secret (min 16 chars); generated
    /// server-side when absent.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Response to subscription creation. This is the only place the secret
/// is ever returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateWebhookResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub webhook: WebhookSubscription,
    pub secret: String,
}

/// Listing of the caller's subscriptions; secrets omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListWebhooksResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub webhooks: Vec<WebhookSubscription>,
    pub total: usize,
}
