//! Axum route handlers for the registry REST surface.

pub mod agents;
pub mod dns;
pub mod ledger;
pub mod resolve;
pub mod system;
pub mod webhooks;
pub mod well_known;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router.
pub fn create_api_router(state: AppState) -> Router {
    let api = Router::new()
        // DNS-01 challenges
        .route("/dns/challenge", post(dns::start_challenge))
        .route("/dns/challenge/:id/verify", post(dns::verify_challenge))
        // Agent lifecycle
        .route(
            "/agents",
            post(agents::register_agent).get(agents::list_agents),
        )
        .route(
            "/agents/:id",
            get(agents::get_agent)
                .patch(agents::update_agent)
                .delete(agents::delete_agent),
        )
        .route("/agents/:id/activate", post(agents::activate_agent))
        .route("/agents/:id/suspend", post(agents::suspend_agent))
        .route("/agents/:id/restore", post(agents::restore_agent))
        .route("/agents/:id/deprecate", post(agents::deprecate_agent))
        .route("/agents/:id/revoke", post(agents::revoke_agent))
        .route("/agents/:id/token", post(agents::mint_task_token))
        // Resolution
        .route("/resolve", get(resolve::resolve_single))
        .route("/resolve/batch", post(resolve::resolve_batch))
        // PKI surface
        .route("/crl", get(agents::get_crl))
        .route("/ca", get(system::ca_certificate))
        // Trust ledger (read-only)
        .route("/ledger", get(ledger::list_entries))
        .route("/ledger/verify", get(ledger::verify))
        .route("/ledger/root", get(ledger::root))
        .route("/ledger/entries/:index", get(ledger::get_entry))
        // Webhook subscriptions
        .route(
            "/webhooks",
            post(webhooks::create_webhook).get(webhooks::list_webhooks),
        )
        .route("/webhooks/:id", delete(webhooks::delete_webhook))
        // Service health
        .route("/health", get(system::health));

    Router::new()
        .nest("/api/v1", api)
        .route("/.well-known/jwks.json", get(well_known::jwks))
        .route("/.well-known/agent-card.json", get(well_known::agent_card))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
