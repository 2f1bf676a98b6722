//! Webhook fan-out: HMAC-signed delivery with bounded retries.
//!
//! Each emitted event is posted to every matching subscription as
//! `{"type", "timestamp", "payload"}`, signed with
//! `X-NAP-Signature: sha256=<hex>` over the exact serialized body.
//! Delivery is at-most-three-tries with 1 s / 5 s waits between attempts;
//! after the final failure the event is dropped and the failure recorded.
//! Nothing here is durable across restarts by design.

use crate::error::{ApiError, ApiResult};
use crate::events::{EventBus, RegistryEvent};
use chrono::Utc;
use hmac::{Hmac, Mac};
use nexus_core::{RegistryError, WebhookDelivery, WebhookSubscription};
use nexus_storage::WebhookRepo;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Signature header attached to every delivery.
pub const SIGNATURE_HEADER: &str = "X-NAP-Signature";

/// Event type header, for cheap demultiplexing before body parsing.
pub const EVENT_HEADER: &str = "X-NAP-Event";

/// Total delivery attempts per event and subscription.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Minimum length of a caller-chosen signing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// Backoff schedule: 1 s, 5 s, 25 s (5× multiplier per step).
fn backoff_after(attempt: u32) -> Duration {
    Duration::from_secs(5u64.pow(attempt.saturating_sub(1)))
}

/// The wire body of a delivery.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebhookBody {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// HMAC-SHA-256 over the serialized body, hex-encoded.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Delivers events to subscriptions and manages the subscription API.
///
/// Every per-event delivery task is tracked in a [`JoinSet`] so shutdown
/// can wait for in-flight attempt sequences to run to their deadlines
/// instead of aborting them mid-backoff.
pub struct WebhookDispatcher {
    repo: Arc<dyn WebhookRepo>,
    client: reqwest::Client,
    attempt_timeout: Duration,
    deliveries: tokio::sync::Mutex<JoinSet<()>>,
}

impl WebhookDispatcher {
    pub fn new(repo: Arc<dyn WebhookRepo>, attempt_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .build()
            .unwrap_or_default();
        WebhookDispatcher {
            repo,
            client,
            attempt_timeout,
            deliveries: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    // ========================================================================
    // SUBSCRIPTION MANAGEMENT
    // ========================================================================

    /// Create a subscription. Returns the record and the secret; the
    /// secret is never retrievable again.
    pub async fn create_subscription(
        &self,
        owner_user_id: Uuid,
        url: &str,
        events: Vec<String>,
        secret: Option<String>,
    ) -> ApiResult<(WebhookSubscription, String)> {
        reqwest::Url::parse(url)
            .map_err(|e| ApiError::invalid_input(format!("webhook url is invalid: {}", e)))?;
        if events.is_empty() {
            return Err(ApiError::missing_field("events"));
        }
        let secret = match secret {
            Some(s) if s.len() < MIN_SECRET_LEN => {
                return Err(ApiError::invalid_input(format!(
                    "secret must be at least {} characters",
                    MIN_SECRET_LEN
                )));
            }
            Some(s) => s,
            None => generate_secret(),
        };

        let subscription = WebhookSubscription {
            id: Uuid::now_v7(),
            owner_user_id,
            url: url.to_string(),
            events,
            secret: secret.clone(),
            created_at: Utc::now(),
        };
        self.repo.webhook_create(&subscription).await?;

        tracing::info!(webhook_id = %subscription.id, url = %subscription.url, "Webhook registered");
        Ok((subscription, secret))
    }

    pub async fn list_subscriptions(
        &self,
        owner_user_id: Uuid,
    ) -> ApiResult<Vec<WebhookSubscription>> {
        Ok(self.repo.webhook_list_by_owner(owner_user_id).await?)
    }

    /// Delete one of the caller's subscriptions.
    pub async fn delete_subscription(&self, id: Uuid, owner_user_id: Uuid) -> ApiResult<()> {
        let subscription = self
            .repo
            .webhook_get(id)
            .await?
            .ok_or_else(|| ApiError::from(RegistryError::not_found("Webhook", id)))?;
        if subscription.owner_user_id != owner_user_id {
            return Err(ApiError::forbidden("not your webhook"));
        }
        self.repo.webhook_delete(id).await?;
        Ok(())
    }

    // ========================================================================
    // DELIVERY
    // ========================================================================

    /// Fan one event out to all matching subscriptions, concurrently.
    pub async fn dispatch(&self, event: &RegistryEvent) {
        let subscriptions = match self.repo.webhook_list_for_event(event.event_type()).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list webhook subscriptions");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let body = WebhookBody {
            event_type: event.event_type().to_string(),
            timestamp: Utc::now(),
            payload: event.payload(),
        };
        let body_bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Webhook body serialization failed");
                return;
            }
        };

        let mut deliveries = self.deliveries.lock().await;
        // Reap finished deliveries so the set never grows unbounded.
        while deliveries.try_join_next().is_some() {}
        for subscription in subscriptions {
            let this_body = body_bytes.clone();
            let event_type = body.event_type.clone();
            let repo = self.repo.clone();
            let client = self.client.clone();
            deliveries.spawn(async move {
                deliver(&client, &repo, &subscription, &event_type, this_body).await;
            });
        }
    }

    /// Wait for every outstanding delivery attempt sequence to finish.
    /// Bounded: a sequence is at most three 10-second attempts plus the
    /// backoff waits between them.
    pub async fn drain_deliveries(&self) {
        let mut deliveries = self.deliveries.lock().await;
        while deliveries.join_next().await.is_some() {}
    }

    /// Subscribe to the bus and dispatch until every sender is gone or
    /// shutdown flips, then drain in-flight deliveries before exiting.
    pub fn spawn(
        self: Arc<Self>,
        bus: &EventBus,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => self.dispatch(&event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(lagged = n, "Webhook dispatcher lagged; events dropped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            tracing::info!("Event bus closed; webhook dispatcher stopping");
                            break;
                        }
                    },
                    _ = shutdown.changed() => {
                        tracing::info!("Webhook dispatcher stopping");
                        break;
                    }
                }
            }
            self.drain_deliveries().await;
            tracing::info!("Webhook dispatcher drained");
        })
    }

    /// Per-attempt timeout, exposed for tests.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}

/// One event → one subscription, with the bounded retry loop.
pub async fn deliver(
    client: &reqwest::Client,
    repo: &Arc<dyn WebhookRepo>,
    subscription: &WebhookSubscription,
    event_type: &str,
    body: Vec<u8>,
) {
    let signature = sign_payload(&subscription.secret, &body);

    let mut success = false;
    let mut attempts = 0;
    for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
        attempts = attempt;
        let result = client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", signature))
            .header(EVENT_HEADER, event_type)
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                success = true;
                break;
            }
            Ok(response) => {
                tracing::warn!(
                    webhook_id = %subscription.id,
                    status = %response.status(),
                    attempt,
                    "Webhook delivery got non-2xx"
                );
            }
            Err(e) => {
                tracing::warn!(
                    webhook_id = %subscription.id,
                    error = %e,
                    attempt,
                    "Webhook delivery failed"
                );
            }
        }
        if attempt < MAX_DELIVERY_ATTEMPTS {
            tokio::time::sleep(backoff_after(attempt)).await;
        }
    }

    if !success {
        tracing::error!(
            webhook_id = %subscription.id,
            event_type,
            "Webhook dropped after {} attempts",
            MAX_DELIVERY_ATTEMPTS
        );
    }
    let record = WebhookDelivery {
        subscription_id: subscription.id,
        event_type: event_type.to_string(),
        success,
        attempts,
        completed_at: Utc::now(),
    };
    if let Err(e) = repo.webhook_record_delivery(&record).await {
        tracing::warn!(webhook_id = %subscription.id, error = %e, "Delivery record write failed");
    }
}

/// Server-generated signing secret: 32 random bytes, hex.
fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hmac() {
        let body = br#"{"type":"agent.revoked","payload":{}}"#;
        let sig_a = sign_payload("topsecret-topsecret", body);
        let sig_b = sign_payload("topsecret-topsecret", body);
        let sig_other = sign_payload("different-secret!", body);
        assert_eq!(sig_a, sig_b);
        assert_ne!(sig_a, sig_other);
        assert_eq!(sig_a.len(), 64);
    }

    #[test]
    fn backoff_schedule_is_one_five_twentyfive() {
        assert_eq!(backoff_after(1), Duration::from_secs(1));
        assert_eq!(backoff_after(2), Duration::from_secs(5));
        assert_eq!(backoff_after(3), Duration::from_secs(25));
    }

    #[tokio::test]
    async fn secrets_are_validated_and_generated() {
        let dispatcher = WebhookDispatcher::new(
            Arc::new(nexus_storage::MemoryWebhookRepo::new()),
            Duration::from_secs(10),
        );
        let owner = Uuid::now_v7();

        let err = dispatcher
            .create_subscription(owner, "https://hooks.example.com", vec!["*".into()], Some("short".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);

        let (sub, secret) = dispatcher
            .create_subscription(owner, "https://hooks.example.com", vec!["*".into()], None)
            .await
            .unwrap();
        assert_eq!(secret.len(), 64);
        assert_eq!(sub.secret, secret);
    }
}
