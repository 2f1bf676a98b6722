//! Shared application state for Axum routers.

use crate::config::RegistryConfig;
use crate::services::{AgentService, DnsVerifier, ResolverService, WebhookDispatcher};
use nexus_pki::TokenIssuer;
use nexus_storage::LedgerRepo;
use std::sync::Arc;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentService>,
    pub resolver: Arc<ResolverService>,
    pub dns: Arc<DnsVerifier>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub ledger: Arc<dyn LedgerRepo>,
    pub tokens: Arc<TokenIssuer>,
    /// Root certificate PEM, served for trust distribution.
    pub ca_pem: String,
    pub config: RegistryConfig,
    pub start_time: std::time::Instant,
}
