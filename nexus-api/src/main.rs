//! Nexus Registry server entry point.
//!
//! Bootstraps tracing, loads or creates the CA, wires the services over
//! the in-memory repositories and serves the Axum router. Background
//! loops (health prober, webhook dispatcher, expiry sweep) observe a
//! shared shutdown signal: on ctrl-c they stop scheduling new work and
//! the process drains.

use std::net::SocketAddr;
use std::sync::Arc;

use nexus_api::services::spawn_expiry_sweep;
use nexus_api::{
    create_api_router, AgentService, ApiConfig, AppState, DnsVerifier, EventBus, HealthProber,
    HickoryTxtLookup, ProberConfig, RegistryConfig, ResolverService, WebhookDispatcher,
};
use nexus_pki::{CaManager, CertIssuer, TokenIssuer};
use nexus_storage::{
    MemoryAgentRepo, MemoryChallengeRepo, MemoryLedgerRepo, MemoryUserRepo, MemoryWebhookRepo,
};
use tracing_subscriber::EnvFilter;

/// Ceiling on waiting for background loops after shutdown is signalled.
/// Covers the longest webhook delivery sequence (three 10 s attempts
/// plus 1 s and 5 s backoff waits) with headroom.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(45);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_config = ApiConfig::from_env();
    let config = RegistryConfig::from_env();

    let ca = Arc::new(CaManager::load_or_create(&config.ca_dir)?);
    let cert_issuer = CertIssuer::new(ca.clone());
    let tokens = Arc::new(TokenIssuer::new(&ca, config.registry_url.clone())?);

    // Repositories. The SQL-backed implementations plug in here; the
    // in-memory set serves tests and single-node deployments.
    let agents_repo = Arc::new(MemoryAgentRepo::new());
    let challenges_repo = Arc::new(MemoryChallengeRepo::new());
    let ledger_repo = Arc::new(MemoryLedgerRepo::new());
    let webhooks_repo = Arc::new(MemoryWebhookRepo::new());
    let users_repo = Arc::new(MemoryUserRepo::new());

    let bus = EventBus::default();
    let dns = Arc::new(DnsVerifier::new(
        challenges_repo,
        Arc::new(HickoryTxtLookup::new(config.dns_timeout)?),
    ));
    let agent_service = Arc::new(AgentService::new(
        agents_repo.clone(),
        ledger_repo.clone(),
        users_repo,
        dns.clone(),
        cert_issuer,
        tokens.clone(),
        bus.clone(),
        config.clone(),
    ));
    let resolver = Arc::new(ResolverService::new(agents_repo.clone()));
    let webhooks = Arc::new(WebhookDispatcher::new(
        webhooks_repo,
        config.webhook_timeout,
    ));

    // Background loops.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let prober = Arc::new(HealthProber::new(
        agents_repo.clone(),
        ledger_repo.clone(),
        bus.clone(),
        ProberConfig {
            interval: config.probe_interval,
            timeout: config.probe_timeout,
            concurrency: config.probe_concurrency,
            fail_threshold: config.probe_fail_threshold,
        },
    ));
    let prober_handle = prober.spawn(shutdown_rx.clone());
    let dispatcher_handle = webhooks.clone().spawn(&bus, shutdown_rx.clone());
    let sweep_handle = spawn_expiry_sweep(
        agent_service.clone(),
        config.expiry_sweep_interval,
        shutdown_rx,
    );

    let state = AppState {
        agents: agent_service,
        resolver,
        dns,
        webhooks,
        ledger: ledger_repo,
        tokens,
        ca_pem: ca.cert_pem().to_string(),
        config,
        start_time: std::time::Instant::now(),
    };
    let app = create_api_router(state);

    let addr: SocketAddr = format!("{}:{}", api_config.bind_host, api_config.port).parse()?;
    tracing::info!(%addr, "Starting Nexus registry");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app);
    let server_result = tokio::select! {
        result = server => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    // Background loops stop scheduling new work on the signal; in-flight
    // work runs to its deadlines before the runtime is dropped.
    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = tokio::join!(prober_handle, dispatcher_handle, sweep_handle);
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Background tasks did not drain within the grace period"
        );
    }

    server_result?;
    Ok(())
}
