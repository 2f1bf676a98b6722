//! Bearer token authentication and per-agent authorization.
//!
//! Two caller identities reach protected endpoints: users (24-hour user
//! tokens, hosted-agent owners) and agents (1-hour task tokens whose
//! `sub` is the agent URI). Both are RS256 JWTs minted by the registry's
//! own token issuer; family dispatch is by claim shape.

use crate::error::ApiError;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use nexus_core::Agent;
use nexus_pki::{TaskClaims, TokenIssuer, UserClaims};

/// Scope that lets a task token manage its own agent's lifecycle.
pub const SCOPE_AGENT_MANAGE: &str = "agent:manage";

/// Scope that lets a task token act on any agent (registry operators).
pub const SCOPE_ADMIN: &str = "admin";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub enum AuthContext {
    User(UserClaims),
    Agent(TaskClaims),
}

impl AuthContext {
    /// A short actor string for ledger entries.
    pub fn actor(&self) -> String {
        match self {
            AuthContext::User(claims) => format!("user:{}", claims.user_id),
            AuthContext::Agent(claims) => claims.sub.clone(),
        }
    }

    pub fn as_user(&self) -> Option<&UserClaims> {
        match self {
            AuthContext::User(claims) => Some(claims),
            AuthContext::Agent(_) => None,
        }
    }
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate a request, accepting either token family.
pub fn authenticate(issuer: &TokenIssuer, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let token =
        bearer_token(headers).ok_or_else(|| ApiError::unauthorized("Bearer token required"))?;

    if let Ok(claims) = issuer.verify_user_token(token) {
        return Ok(AuthContext::User(claims));
    }
    match issuer.verify_task_token(token, &[]) {
        Ok(claims) => Ok(AuthContext::Agent(claims)),
        Err(e) => Err(ApiError::new(
            crate::error::ErrorCode::InvalidToken,
            e.to_string(),
        )),
    }
}

/// Authenticate and require a user token specifically.
pub fn authenticate_user(
    issuer: &TokenIssuer,
    headers: &HeaderMap,
) -> Result<UserClaims, ApiError> {
    match authenticate(issuer, headers)? {
        AuthContext::User(claims) => Ok(claims),
        AuthContext::Agent(_) => Err(ApiError::forbidden("A user token is required here")),
    }
}

/// Whether `ctx` may manage `agent` (update, lifecycle transitions).
///
/// Permitted for: the owning user of a hosted agent, a task token whose
/// subject is the agent itself and carries the manage scope, or an
/// admin-scoped task token.
pub fn may_manage_agent(ctx: &AuthContext, agent: &Agent) -> bool {
    match ctx {
        AuthContext::User(claims) => agent.owner_user_id == Some(claims.user_id),
        AuthContext::Agent(claims) => {
            if claims.has_scope(SCOPE_ADMIN) {
                return true;
            }
            claims.sub == agent.uri().to_string() && claims.has_scope(SCOPE_AGENT_MANAGE)
        }
    }
}

/// Whether `ctx` may permanently delete `agent`: the agent itself or an
/// admin scope; deletion is not a user-token operation.
pub fn may_delete_agent(ctx: &AuthContext, agent: &Agent) -> bool {
    match ctx {
        AuthContext::User(_) => false,
        AuthContext::Agent(claims) => {
            claims.has_scope(SCOPE_ADMIN)
                || (claims.sub == agent.uri().to_string() && claims.has_scope(SCOPE_AGENT_MANAGE))
        }
    }
}

/// Guard an operation on `agent`, returning 403 when not permitted.
pub fn require_manage(ctx: &AuthContext, agent: &Agent) -> Result<(), ApiError> {
    if may_manage_agent(ctx, agent) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Caller does not control this agent",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use nexus_core::{
        AgentId, AgentStatus, CapabilityNode, HealthState, RegistrationType, TrustRoot,
    };
    use nexus_pki::CaManager;
    use uuid::Uuid;

    fn issuer() -> TokenIssuer {
        let dir = tempfile::tempdir().unwrap();
        let ca = CaManager::load_or_create_with_bits(dir.path(), 2048).unwrap();
        TokenIssuer::new(&ca, "https://registry.nexus.test").unwrap()
    }

    fn hosted_agent(owner: Uuid) -> Agent {
        let now = Utc::now();
        Agent {
            id: Uuid::now_v7(),
            agent_id: AgentId::from_suffix("abcdefgh23").unwrap(),
            trust_root: TrustRoot::Hosted,
            capability_node: CapabilityNode::parse("retail").unwrap(),
            registration_type: RegistrationType::NapHosted,
            status: AgentStatus::Active,
            endpoint: "https://a.example".to_string(),
            display_name: "Retail".to_string(),
            description: String::new(),
            tags: vec![],
            skills: vec![],
            mcp_tools: vec![],
            metadata: None,
            owner_domain: None,
            owner_user_id: Some(owner),
            cert_serial: Some("00".repeat(16)),
            public_key_pem: None,
            suspended_at: None,
            deprecated_at: None,
            sunset_date: None,
            replacement_uri: None,
            revocation_reason: None,
            revoked_at: None,
            health_status: HealthState::Unknown,
            last_seen_at: None,
            support_url: None,
            version: None,
            cert_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn dispatches_user_and_task_tokens() {
        let issuer = issuer();
        let user_token = issuer
            .issue_user_token(Uuid::now_v7(), "a@example.com", "alice", "free")
            .unwrap();
        let task_token = issuer
            .issue_task_token(
                "agent://nap/retail/agent_abcdefgh23",
                vec![SCOPE_AGENT_MANAGE.to_string()],
            )
            .unwrap();

        assert!(matches!(
            authenticate(&issuer, &headers_with(&user_token)).unwrap(),
            AuthContext::User(_)
        ));
        assert!(matches!(
            authenticate(&issuer, &headers_with(&task_token)).unwrap(),
            AuthContext::Agent(_)
        ));
        assert!(authenticate(&issuer, &HeaderMap::new()).is_err());
    }

    #[test]
    fn owning_user_may_manage_hosted_agent() {
        let issuer = issuer();
        let owner = Uuid::now_v7();
        let agent = hosted_agent(owner);

        let own_token = issuer
            .issue_user_token(owner, "a@example.com", "alice", "free")
            .unwrap();
        let other_token = issuer
            .issue_user_token(Uuid::now_v7(), "b@example.com", "bob", "free")
            .unwrap();

        let own = authenticate(&issuer, &headers_with(&own_token)).unwrap();
        let other = authenticate(&issuer, &headers_with(&other_token)).unwrap();
        assert!(may_manage_agent(&own, &agent));
        assert!(!may_manage_agent(&other, &agent));
        // Users never get delete.
        assert!(!may_delete_agent(&own, &agent));
    }

    #[test]
    fn agent_token_is_subject_scoped() {
        let issuer = issuer();
        let agent = hosted_agent(Uuid::now_v7());

        let self_token = issuer
            .issue_task_token(&agent.uri().to_string(), vec![SCOPE_AGENT_MANAGE.to_string()])
            .unwrap();
        let stranger_token = issuer
            .issue_task_token(
                "agent://nap/other/agent_zzzzzzzz77",
                vec![SCOPE_AGENT_MANAGE.to_string()],
            )
            .unwrap();
        let admin_token = issuer
            .issue_task_token(
                "agent://nap/ops/agent_yyyyyyyy66",
                vec![SCOPE_ADMIN.to_string()],
            )
            .unwrap();

        let own = authenticate(&issuer, &headers_with(&self_token)).unwrap();
        let stranger = authenticate(&issuer, &headers_with(&stranger_token)).unwrap();
        let admin = authenticate(&issuer, &headers_with(&admin_token)).unwrap();

        assert!(may_manage_agent(&own, &agent));
        assert!(may_delete_agent(&own, &agent));
        assert!(!may_manage_agent(&stranger, &agent));
        assert!(may_manage_agent(&admin, &agent));
        assert!(may_delete_agent(&admin, &agent));
    }
}
