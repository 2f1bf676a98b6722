//! Published discovery documents: the agent card and the MCP manifest.
//!
//! The card follows the A2A discovery convention and is extended with
//! `nap:*` fields carrying the registry's attestation, including the
//! long-lived endorsement JWT minted at activation.

use crate::{Agent, McpTool, TrustTier};
use serde::{Deserialize, Serialize};

/// Discovery card published for an activated agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    /// The agent's live endpoint.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub skills: Vec<String>,
    pub tags: Vec<String>,
    /// Permanent `agent://` URI.
    #[serde(rename = "nap:uri")]
    pub nap_uri: String,
    #[serde(rename = "nap:trust_tier")]
    pub nap_trust_tier: TrustTier,
    #[serde(rename = "nap:cert_serial", skip_serializing_if = "Option::is_none")]
    pub nap_cert_serial: Option<String>,
    /// Base URL of the issuing registry.
    #[serde(rename = "nap:registry")]
    pub nap_registry: String,
    /// Signed endorsement JWT; verifiable against the registry JWKS.
    #[serde(rename = "nap:endorsement", skip_serializing_if = "Option::is_none")]
    pub nap_endorsement: Option<String>,
}

impl AgentCard {
    /// Build the card for an agent as it stands, attaching the endorsement
    /// minted at activation.
    pub fn for_agent(agent: &Agent, registry_url: &str, endorsement_jwt: Option<String>) -> Self {
        AgentCard {
            name: agent.display_name.clone(),
            description: agent.description.clone(),
            url: agent.endpoint.clone(),
            version: agent.version.clone(),
            skills: agent.skills.clone(),
            tags: agent.tags.clone(),
            nap_uri: agent.uri().to_string(),
            nap_trust_tier: agent.trust_tier(),
            nap_cert_serial: agent.cert_serial.clone(),
            nap_registry: registry_url.to_string(),
            nap_endorsement: endorsement_jwt,
        }
    }
}

/// MCP tool manifest, emitted at activation for agents that declare tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct McpManifest {
    pub name: String,
    /// Permanent `agent://` URI of the serving agent.
    pub agent_uri: String,
    pub endpoint: String,
    pub tools: Vec<McpTool>,
}

impl McpManifest {
    /// Build the manifest for an agent's declared tools; `None` when the
    /// agent declares no tools.
    pub fn for_agent(agent: &Agent) -> Option<Self> {
        if agent.mcp_tools.is_empty() {
            return None;
        }
        Some(McpManifest {
            name: agent.display_name.clone(),
            agent_uri: agent.uri().to_string(),
            endpoint: agent.endpoint.clone(),
            tools: agent.mcp_tools.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AgentId, AgentStatus, CapabilityNode, HealthState, RegistrationType, TrustRoot,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn active_domain_agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: Uuid::now_v7(),
            agent_id: AgentId::from_suffix("abcdefgh23").unwrap(),
            trust_root: TrustRoot::Domain("acme.com".to_string()),
            capability_node: CapabilityNode::parse("finance>billing").unwrap(),
            registration_type: RegistrationType::Domain,
            status: AgentStatus::Active,
            endpoint: "https://agents.acme.com/billing".to_string(),
            display_name: "Billing Agent".to_string(),
            description: "Handles invoices".to_string(),
            tags: vec!["finance".to_string()],
            skills: vec!["billing".to_string()],
            mcp_tools: vec![McpTool {
                name: "create_invoice".to_string(),
                description: None,
                input_schema: None,
            }],
            metadata: None,
            owner_domain: Some("acme.com".to_string()),
            owner_user_id: None,
            cert_serial: Some("ab".repeat(16)),
            public_key_pem: Some("-----BEGIN PUBLIC KEY-----".to_string()),
            suspended_at: None,
            deprecated_at: None,
            sunset_date: None,
            replacement_uri: None,
            revocation_reason: None,
            revoked_at: None,
            health_status: HealthState::Unknown,
            last_seen_at: None,
            support_url: None,
            version: Some("1.2.0".to_string()),
            cert_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn card_carries_nap_extensions() {
        let agent = active_domain_agent();
        let card = AgentCard::for_agent(&agent, "https://registry.nexus.dev", Some("ey.j.wt".to_string()));
        assert_eq!(card.nap_trust_tier, TrustTier::Trusted);
        assert_eq!(
            card.nap_uri,
            "agent://acme.com/finance/billing/agent_abcdefgh23"
        );

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["nap:registry"], "https://registry.nexus.dev");
        assert_eq!(json["nap:endorsement"], "ey.j.wt");
    }

    #[test]
    fn manifest_only_for_tool_bearing_agents() {
        let mut agent = active_domain_agent();
        assert!(McpManifest::for_agent(&agent).is_some());
        agent.mcp_tools.clear();
        assert!(McpManifest::for_agent(&agent).is_none());
    }
}
