//! Health prober transition semantics and signed webhook delivery,
//! driven against real local HTTP servers.

mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::any;
use axum::Router;
use common::test_registry;
use hmac::{Hmac, Mac};
use nexus_api::{HealthProber, ProberConfig, RegistryEvent};
use nexus_core::{Agent, HealthState, LedgerAction, WebhookSubscription};
use nexus_storage::{AgentRepo, LedgerRepo, WebhookRepo};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Serve every method on `/` with a switchable status code.
async fn spawn_status_server(status: Arc<AtomicU16>) -> SocketAddr {
    async fn handler(State(status): State<Arc<AtomicU16>>) -> StatusCode {
        StatusCode::from_u16(status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
    }
    let app = Router::new().route("/", any(handler)).with_state(status);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

type CapturedDeliveries = Arc<Mutex<Vec<(Option<String>, Vec<u8>)>>>;

/// Capture webhook POSTs: (signature header, body bytes).
async fn spawn_capture_server(captured: CapturedDeliveries) -> SocketAddr {
    async fn handler(
        State(captured): State<CapturedDeliveries>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let signature = headers
            .get("x-nap-signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured.lock().await.push((signature, body.to_vec()));
        StatusCode::OK
    }
    let app = Router::new().route("/", any(handler)).with_state(captured);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn prober_for(registry: &common::TestRegistry) -> Arc<HealthProber> {
    Arc::new(HealthProber::new(
        registry.agents_repo.clone(),
        registry.ledger.clone(),
        registry.bus.clone(),
        ProberConfig {
            interval: Duration::from_secs(300),
            timeout: Duration::from_secs(2),
            concurrency: 4,
            fail_threshold: 3,
        },
    ))
}

#[tokio::test]
async fn degraded_after_threshold_then_single_recovery() {
    let registry = test_registry().await;
    let status = Arc::new(AtomicU16::new(500));
    let addr = spawn_status_server(status.clone()).await;

    let agent = registry.activated_domain_agent("acme.com", "ops>monitoring").await;
    // Point the live record at the local failing server.
    registry
        .state
        .agents
        .update(
            &agent.id.to_string(),
            nexus_core::AgentUpdate {
                endpoint: Some(format!("http://{}/", addr)),
                ..Default::default()
            },
            &admin(&registry).await,
        )
        .await
        .unwrap();

    let stored = |registry: &common::TestRegistry| {
        let repo = registry.agents_repo.clone();
        let id = agent.id;
        async move {
            let agent: Agent = repo.agent_get(id).await.unwrap().expect("agent exists");
            agent
        }
    };

    let prober = prober_for(&registry);

    // Two failing ticks: under threshold, no writes, no ledger growth.
    let len_before = registry.ledger.ledger_len().await.unwrap();
    prober.run_tick().await;
    prober.run_tick().await;
    let after_two = stored(&registry).await;
    assert_eq!(after_two.health_status, HealthState::Unknown);
    assert_eq!(registry.ledger.ledger_len().await.unwrap(), len_before);

    // Third consecutive failure crosses the threshold: one transition.
    prober.run_tick().await;
    let degraded = stored(&registry).await;
    assert_eq!(degraded.health_status, HealthState::Degraded);
    let entries = registry.ledger.ledger_all().await.unwrap();
    assert_eq!(
        entries.last().unwrap().action,
        LedgerAction::HealthDegraded
    );
    let len_after_degrade = entries.len() as u64;

    // Staying down adds nothing: the transition already happened.
    prober.run_tick().await;
    assert_eq!(
        registry.ledger.ledger_len().await.unwrap(),
        len_after_degrade
    );

    // Recovery: one pass flips it back, exactly once.
    status.store(200, Ordering::SeqCst);
    prober.run_tick().await;
    let recovered = stored(&registry).await;
    assert_eq!(recovered.health_status, HealthState::Healthy);
    assert!(recovered.last_seen_at.is_some());
    let entries = registry.ledger.ledger_all().await.unwrap();
    assert_eq!(
        entries.last().unwrap().action,
        LedgerAction::HealthRecovered
    );
    let len_after_recover = entries.len() as u64;

    // Steady-state healthy: zero additional writes.
    prober.run_tick().await;
    prober.run_tick().await;
    assert_eq!(
        registry.ledger.ledger_len().await.unwrap(),
        len_after_recover
    );
    let steady = stored(&registry).await;
    assert_eq!(steady.updated_at, recovered.updated_at);
}

#[tokio::test]
async fn webhook_delivery_is_signed_and_recorded() {
    let registry = test_registry().await;
    let captured: CapturedDeliveries = Arc::new(Mutex::new(Vec::new()));
    let addr = spawn_capture_server(captured.clone()).await;

    let user = registry.verified_user("observer").await;
    let (subscription, secret): (WebhookSubscription, String) = registry
        .state
        .webhooks
        .create_subscription(
            user.user_id,
            &format!("http://{}/", addr),
            vec!["agent.health_degraded".to_string()],
            None,
        )
        .await
        .unwrap();

    // A matching event delivers; a non-matching one does not.
    registry
        .state
        .webhooks
        .dispatch(&RegistryEvent::HealthDegraded {
            agent_uri: "agent://acme.com/ops/agent_abcdefgh23".to_string(),
            consecutive_failures: 3,
        })
        .await;
    registry
        .state
        .webhooks
        .dispatch(&RegistryEvent::AgentSuspended {
            agent_uri: "agent://acme.com/ops/agent_abcdefgh23".to_string(),
        })
        .await;

    // Delivery happens on tracked tasks; drain waits them out.
    registry.state.webhooks.drain_deliveries().await;

    let deliveries = captured.lock().await;
    assert_eq!(deliveries.len(), 1, "only the subscribed event delivers");
    let (signature, body) = &deliveries[0];

    // Body shape: {"type", "timestamp", "payload"}.
    let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(parsed["type"], "agent.health_degraded");
    assert_eq!(parsed["payload"]["consecutive_failures"], 3);
    assert!(parsed["timestamp"].is_string());

    // Signature verifies as HMAC-SHA-256(secret, exact body).
    let signature = signature.as_deref().expect("signature header present");
    let hex_part = signature.strip_prefix("sha256=").expect("sha256= prefix");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    assert_eq!(hex::encode(mac.finalize().into_bytes()), hex_part);

    // The outcome is recorded against the subscription before the
    // delivery task completes, so after the drain it must be there.
    drop(deliveries);
    let records = registry
        .webhooks_repo
        .webhook_list_deliveries(subscription.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].attempts, 1);
}

#[tokio::test]
async fn prober_emits_event_that_reaches_dispatcher() {
    let registry = test_registry().await;

    // Failing agent endpoint + capture server for the webhook.
    let status = Arc::new(AtomicU16::new(503));
    let agent_addr = spawn_status_server(status).await;
    let captured: CapturedDeliveries = Arc::new(Mutex::new(Vec::new()));
    let hook_addr = spawn_capture_server(captured.clone()).await;

    let user = registry.verified_user("oncall").await;
    registry
        .state
        .webhooks
        .create_subscription(
            user.user_id,
            &format!("http://{}/", hook_addr),
            vec!["*".to_string()],
            None,
        )
        .await
        .unwrap();

    // Wire the dispatcher to the bus the prober publishes on.
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    registry
        .state
        .webhooks
        .clone()
        .spawn(&registry.bus, shutdown_rx);

    let agent = registry.activated_domain_agent("acme.com", "ops").await;
    registry
        .state
        .agents
        .update(
            &agent.id.to_string(),
            nexus_core::AgentUpdate {
                endpoint: Some(format!("http://{}/", agent_addr)),
                ..Default::default()
            },
            &admin(&registry).await,
        )
        .await
        .unwrap();

    let prober = prober_for(&registry);
    for _ in 0..3 {
        prober.run_tick().await;
    }

    // The degraded event fans out through the dispatcher to the hook.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let deliveries = captured.lock().await;
        if deliveries
            .iter()
            .any(|(_, body)| {
                serde_json::from_slice::<serde_json::Value>(body)
                    .is_ok_and(|v| v["type"] == "agent.health_degraded")
            })
        {
            break;
        }
        drop(deliveries);
        assert!(
            tokio::time::Instant::now() < deadline,
            "health_degraded webhook never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn admin(registry: &common::TestRegistry) -> nexus_api::auth::AuthContext {
    let token = registry
        .state
        .tokens
        .issue_task_token(
            "agent://nap/ops/agent_operator22",
            vec!["admin".to_string()],
        )
        .unwrap();
    let claims = registry.state.tokens.verify_task_token(&token, &[]).unwrap();
    nexus_api::auth::AuthContext::Agent(claims)
}
