//! Agent DTOs.

use chrono::{DateTime, Utc};
use nexus_core::{
    Agent, AgentCard, AgentStatus, AgentUpdate, McpManifest, McpTool, RegistrationType,
    ThreatReport, TrustTier,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registration request body.
///
/// Domain registrations carry `owner_domain`; hosted registrations are
/// authenticated by a user token and may carry a `username`, which is
/// deliberately NOT used in URI derivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegisterAgentRequest {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Capability path; `>` or `/` separated, at most three levels.
    pub capability: String,
    pub endpoint: String,
    /// Required for domain registrations; must match the DNS-verified
    /// namespace at activation time.
    #[serde(default)]
    pub owner_domain: Option<String>,
    /// Accepted for hosted registrations and ignored for naming; hosted
    /// agents always live under `agent://nap/...`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_tools: Vec<McpTool>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub support_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// An agent as returned by the API: the record plus derived fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentResponse {
    #[serde(flatten)]
    pub agent: Agent,
    /// Permanent `agent://` URI.
    pub agent_uri: String,
    /// Computed trust tier.
    pub trust_tier: TrustTier,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        let agent_uri = agent.uri().to_string();
        let trust_tier = agent.trust_tier();
        AgentResponse {
            agent,
            agent_uri,
            trust_tier,
        }
    }
}

/// Response to a registration: the pending agent and its threat report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegisterAgentResponse {
    pub agent: AgentResponse,
    pub threat_report: ThreatReport,
}

/// The once-only activation bundle.
///
/// `private_key_pem` exists only in this response; the registry does not
/// retain it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ActivateAgentResponse {
    pub agent: AgentResponse,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ca_pem: String,
    pub cert_serial: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub cert_expires_at: DateTime<Utc>,
    /// Long-lived endorsement JWT, also embedded in the agent card.
    pub endorsement_jwt: String,
    /// Initial task token for the agent's own protected operations.
    pub task_token: String,
    pub agent_card: AgentCard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_manifest: Option<McpManifest>,
}

/// PATCH body for mutable fields. Identity fields are rejected by
/// construction: they are simply not part of this type.
pub type UpdateAgentRequest = AgentUpdate;

/// Body for the deprecate transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeprecateAgentRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub sunset_date: Option<DateTime<Utc>>,
    pub replacement_uri: Option<String>,
}

/// Body for the revoke transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RevokeAgentRequest {
    pub reason: String,
}

/// Query parameters for agent listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct ListAgentsQuery {
    pub status: Option<AgentStatus>,
    pub registration_type: Option<RegistrationType>,
    pub trust_root: Option<String>,
    pub capability: Option<String>,
    pub owner_domain: Option<String>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = "uuid"))]
    pub owner_user_id: Option<Uuid>,
    /// Free-text filter over display name, description and tags.
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Paged agent listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentResponse>,
    pub total: usize,
}

/// A freshly minted task token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskTokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in_secs: i64,
    pub scopes: Vec<String>,
}

/// Entry in the published certificate revocation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CrlEntry {
    pub cert_serial: String,
    pub reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub revoked_at: Option<DateTime<Utc>>,
}

/// The published CRL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CrlResponse {
    pub entries: Vec<CrlEntry>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub generated_at: DateTime<Utc>,
}

/// Service health document for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ServiceHealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub ledger_entries: u64,
    /// Probed agent health is separate; this is the registry process.
    pub version: String,
}

// Re-exported so handlers can build filters from query params.
impl ListAgentsQuery {
    /// Convert to a repository filter; invalid trust roots surface as a
    /// validation error at the route layer before this is called.
    pub fn into_filter(
        self,
        trust_root: Option<nexus_core::TrustRoot>,
    ) -> nexus_storage::AgentFilter {
        nexus_storage::AgentFilter {
            status: self.status,
            trust_root,
            registration_type: self.registration_type,
            capability: self.capability,
            owner_domain: self.owner_domain,
            owner_user_id: self.owner_user_id,
            q: self.q,
            limit: self.limit.unwrap_or(0),
            offset: self.offset.unwrap_or(0),
        }
    }
}

