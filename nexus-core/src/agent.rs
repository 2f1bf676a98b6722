//! Agent entity types and the lifecycle state machine.
//!
//! The [`Agent`] record is the central entity of the registry. Its status
//! moves through a fixed state machine; every transition is validated by
//! [`AgentStatus::can_transition_to`] and recorded in the trust ledger by
//! the service layer.

use crate::{AgentId, AgentUri, CapabilityNode, RegistryError, RegistryResult, TrustRoot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ENUMS
// ============================================================================

/// How an agent was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RegistrationType {
    /// Anchored to a DNS-verified domain.
    Domain,
    /// Hosted under the registry's own `nap` namespace.
    NapHosted,
}

impl RegistrationType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RegistrationType::Domain => "domain",
            RegistrationType::NapHosted => "nap_hosted",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> RegistryResult<Self> {
        match s {
            "domain" => Ok(RegistrationType::Domain),
            "nap_hosted" => Ok(RegistrationType::NapHosted),
            _ => Err(RegistryError::validation(
                "registration_type",
                format!("unknown registration type {:?}", s),
            )),
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for RegistrationType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Lifecycle status of an agent.
///
/// ```text
/// pending ── activate ──► active
/// active ── suspend ──► suspended ── restore ──► active
/// active ── deprecate ──► deprecated
/// {active, suspended, deprecated} ── revoke ──► revoked
/// {active, deprecated} ── cert expiry ──► expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Active,
    Suspended,
    Deprecated,
    Revoked,
    Expired,
}

impl AgentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Active => "active",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Deprecated => "deprecated",
            AgentStatus::Revoked => "revoked",
            AgentStatus::Expired => "expired",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> RegistryResult<Self> {
        match s {
            "pending" => Ok(AgentStatus::Pending),
            "active" => Ok(AgentStatus::Active),
            "suspended" => Ok(AgentStatus::Suspended),
            "deprecated" => Ok(AgentStatus::Deprecated),
            "revoked" => Ok(AgentStatus::Revoked),
            "expired" => Ok(AgentStatus::Expired),
            _ => Err(RegistryError::validation(
                "status",
                format!("unknown status {:?}", s),
            )),
        }
    }

    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// This is the single source of truth for transition legality; the
    /// service layer rejects anything this returns `false` for with
    /// an `InvalidTransition` error.
    pub fn can_transition_to(&self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (*self, to),
            (Pending, Active)
                | (Active, Suspended)
                | (Active, Deprecated)
                | (Active, Revoked)
                | (Active, Expired)
                | (Suspended, Active)
                | (Suspended, Revoked)
                | (Deprecated, Revoked)
                | (Deprecated, Expired)
        )
    }

    /// Terminal states admit no further forward transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Revoked | AgentStatus::Expired)
    }

    /// Whether a URI pointing at an agent in this status resolves.
    /// Deprecated agents still resolve so callers can learn the
    /// replacement; everything outside {active, deprecated} does not.
    pub fn is_resolvable(&self) -> bool {
        matches!(self, AgentStatus::Active | AgentStatus::Deprecated)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for AgentStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Probed availability of an agent's endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Endpoint answered a recent probe.
    Healthy,
    /// Endpoint failed the probe threshold.
    Degraded,
    /// Never probed.
    #[default]
    Unknown,
}

impl HealthState {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unknown => "unknown",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> RegistryResult<Self> {
        match s {
            "healthy" => Ok(HealthState::Healthy),
            "degraded" => Ok(HealthState::Degraded),
            "unknown" => Ok(HealthState::Unknown),
            _ => Err(RegistryError::validation(
                "health_status",
                format!("unknown health state {:?}", s),
            )),
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Computed credibility label, a pure function of persistent fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// Domain agent, active, certificate issued.
    Trusted,
    /// Domain agent, active, no certificate on record.
    Verified,
    /// Hosted agent, active.
    Basic,
    /// Everything else.
    Unverified,
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrustTier::Trusted => "trusted",
            TrustTier::Verified => "verified",
            TrustTier::Basic => "basic",
            TrustTier::Unverified => "unverified",
        };
        f.write_str(s)
    }
}

// ============================================================================
// MCP TOOLS
// ============================================================================

/// A tool an agent exposes over MCP, as declared at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct McpTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool input, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub input_schema: Option<serde_json::Value>,
}

// ============================================================================
// AGENT ENTITY
// ============================================================================

/// The central registry entity.
///
/// Fields encoded in the URI (`trust_root`, `capability_node`, `agent_id`)
/// are immutable after creation, as are `registration_type` and the owner
/// fields. `cert_serial` is set exactly once, at first activation, and the
/// corresponding private key is never retained by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Agent {
    /// Opaque internal identifier.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
    /// External short identifier (`agent_` + 10 base32 chars).
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub agent_id: AgentId,
    /// Verified domain or the literal `nap`.
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub trust_root: TrustRoot,
    /// Normalized `>`-separated capability path.
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub capability_node: CapabilityNode,
    pub registration_type: RegistrationType,
    pub status: AgentStatus,
    /// Absolute endpoint URL. HTTPS required in production unless loopback.
    pub endpoint: String,
    pub display_name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub mcp_tools: Vec<McpTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    /// Set iff `registration_type` is `domain`.
    pub owner_domain: Option<String>,
    /// Set iff `registration_type` is `nap_hosted`.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub owner_user_id: Option<Uuid>,
    /// Lowercase hex serial of the issued certificate; non-empty iff the
    /// agent has ever been activated.
    pub cert_serial: Option<String>,
    /// Subject public key of the issued certificate.
    pub public_key_pem: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub suspended_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deprecated_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub sunset_date: Option<DateTime<Utc>>,
    /// URI of the successor agent, for deprecated agents.
    pub replacement_uri: Option<String>,
    pub revocation_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub revoked_at: Option<DateTime<Utc>>,
    pub health_status: HealthState,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_seen_at: Option<DateTime<Utc>>,
    pub support_url: Option<String>,
    pub version: Option<String>,
    /// End of certificate validity, set at activation. Drives the expiry
    /// sweep.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub cert_expires_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// The permanent URI derived from the immutable identity triple.
    pub fn uri(&self) -> AgentUri {
        AgentUri::derive(
            self.trust_root.clone(),
            &self.capability_node,
            self.agent_id.clone(),
        )
    }

    /// Whether the agent has ever been activated.
    pub fn has_been_activated(&self) -> bool {
        self.cert_serial.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Compute the trust tier from persistent fields.
    pub fn trust_tier(&self) -> TrustTier {
        match (self.registration_type, self.status) {
            (RegistrationType::Domain, AgentStatus::Active) => {
                if self.has_been_activated() {
                    TrustTier::Trusted
                } else {
                    TrustTier::Verified
                }
            }
            (RegistrationType::NapHosted, AgentStatus::Active) => TrustTier::Basic,
            _ => TrustTier::Unverified,
        }
    }

    /// Check the owner-field invariant: domain agents carry exactly
    /// `owner_domain`, hosted agents exactly `owner_user_id`.
    pub fn owner_fields_consistent(&self) -> bool {
        match self.registration_type {
            RegistrationType::Domain => {
                self.owner_domain.as_deref().is_some_and(|d| !d.is_empty())
                    && self.owner_user_id.is_none()
            }
            RegistrationType::NapHosted => {
                self.owner_user_id.is_some()
                    && self.owner_domain.is_none()
                    && self.trust_root.is_hosted()
            }
        }
    }
}

/// Mutable-field patch applied by the update operation.
///
/// Everything encoded in the URI, the registration type, the owner fields
/// and the certificate serial are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub endpoint: Option<String>,
    pub tags: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub mcp_tools: Option<Vec<McpTool>>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    pub support_url: Option<String>,
    pub version: Option<String>,
}

impl AgentUpdate {
    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        self == &AgentUpdate::default()
    }

    /// Apply the patch to an agent record, bumping `updated_at`.
    pub fn apply(&self, agent: &mut Agent, now: DateTime<Utc>) {
        if let Some(v) = &self.display_name {
            agent.display_name = v.clone();
        }
        if let Some(v) = &self.description {
            agent.description = v.clone();
        }
        if let Some(v) = &self.endpoint {
            agent.endpoint = v.clone();
        }
        if let Some(v) = &self.tags {
            agent.tags = v.clone();
        }
        if let Some(v) = &self.skills {
            agent.skills = v.clone();
        }
        if let Some(v) = &self.mcp_tools {
            agent.mcp_tools = v.clone();
        }
        if let Some(v) = &self.metadata {
            agent.metadata = Some(v.clone());
        }
        if let Some(v) = &self.support_url {
            agent.support_url = Some(v.clone());
        }
        if let Some(v) = &self.version {
            agent.version = Some(v.clone());
        }
        agent.updated_at = now;
    }
}
