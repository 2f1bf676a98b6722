//! OpenAPI document aggregation.

use crate::routes;
use utoipa::OpenApi;

/// The registry's OpenAPI description.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nexus Agent Registry API",
        description = "Identity, naming and discovery for autonomous agents: \
                       DNS-01 verified trust roots, X.509 issuance against a \
                       self-managed CA, `agent://` resolution, a hash-chained \
                       trust ledger, and signed webhooks.",
        license(name = "MIT")
    ),
    paths(
        routes::dns::start_challenge,
        routes::dns::verify_challenge,
        routes::agents::register_agent,
        routes::agents::list_agents,
        routes::agents::get_agent,
        routes::agents::activate_agent,
        routes::agents::update_agent,
        routes::agents::suspend_agent,
        routes::agents::restore_agent,
        routes::agents::deprecate_agent,
        routes::agents::revoke_agent,
        routes::agents::delete_agent,
        routes::agents::mint_task_token,
        routes::agents::get_crl,
        routes::resolve::resolve_single,
        routes::resolve::resolve_batch,
        routes::ledger::list_entries,
        routes::ledger::get_entry,
        routes::ledger::verify,
        routes::ledger::root,
        routes::webhooks::create_webhook,
        routes::webhooks::list_webhooks,
        routes::webhooks::delete_webhook,
        routes::well_known::jwks,
        routes::well_known::agent_card,
        routes::system::health,
        routes::system::ca_certificate,
    ),
    components(schemas(
        crate::error::ApiError,
        crate::error::ErrorCode,
        crate::types::RegisterAgentRequest,
        crate::types::RegisterAgentResponse,
        crate::types::AgentResponse,
        crate::types::ActivateAgentResponse,
        crate::types::DeprecateAgentRequest,
        crate::types::RevokeAgentRequest,
        crate::types::ListAgentsResponse,
        crate::types::TaskTokenResponse,
        crate::types::CrlEntry,
        crate::types::CrlResponse,
        crate::types::ServiceHealthResponse,
        crate::types::StartChallengeRequest,
        crate::types::ChallengeResponse,
        crate::types::VerifyChallengeResponse,
        crate::types::ResolveResponse,
        crate::types::DeprecationInfo,
        crate::types::BatchResolveRequest,
        crate::types::BatchResolveItem,
        crate::types::BatchResolveResponse,
        crate::types::LedgerListResponse,
        crate::types::LedgerVerifyResponse,
        crate::types::CreateWebhookRequest,
        crate::types::CreateWebhookResponse,
        crate::types::ListWebhooksResponse,
        nexus_core::Agent,
        nexus_core::AgentStatus,
        nexus_core::AgentUpdate,
        nexus_core::AgentCard,
        nexus_core::DnsChallenge,
        nexus_core::HealthState,
        nexus_core::LedgerAction,
        nexus_core::LedgerEntry,
        nexus_core::McpManifest,
        nexus_core::McpTool,
        nexus_core::RegistrationType,
        nexus_core::ThreatFinding,
        nexus_core::ThreatReport,
        nexus_core::ThreatSeverity,
        nexus_core::TrustTier,
    )),
    tags(
        (name = "Agents", description = "Registration, activation and lifecycle"),
        (name = "DNS", description = "DNS-01 domain-ownership challenges"),
        (name = "Resolve", description = "agent:// URI resolution"),
        (name = "Ledger", description = "Append-only trust ledger, read-only"),
        (name = "PKI", description = "Certificate revocation list"),
        (name = "Webhooks", description = "Event subscriptions"),
        (name = "Discovery", description = ".well-known documents"),
        (name = "System", description = "Process health"),
    )
)]
pub struct ApiDoc;
