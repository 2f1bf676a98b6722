//! Agent lifecycle orchestration: the registry's state machine.
//!
//! Every mutation flows through here so the invariants hold at each
//! observable state: URI fields never change after creation, `cert_serial`
//! is written exactly once at first activation, every lifecycle event
//! lands in the trust ledger, and status writes go through the
//! repository's compare-and-set so concurrent writers (owner operations
//! vs. the health prober) cannot produce an illegal transition.

use crate::auth::{self, AuthContext};
use crate::config::RegistryConfig;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::events::{EventBus, RegistryEvent};
use crate::services::DnsVerifier;
use crate::types::{
    ActivateAgentResponse, CrlEntry, CrlResponse, DeprecateAgentRequest, RegisterAgentRequest,
    TaskTokenResponse,
};
use crate::validation::{require_non_empty, validate_endpoint};
use chrono::Utc;
use nexus_core::{
    score_registration, Agent, AgentCard, AgentId, AgentStatus, AgentUpdate, AgentUri,
    CapabilityNode, HealthState, LedgerAction, McpManifest, RegistrationType, RegistryError,
    ThreatReport, TrustRoot, AGENT_ID_ALPHABET, AGENT_ID_RANDOM_LEN,
};
use nexus_pki::{CertIssuer, TokenIssuer, UserClaims};
use nexus_storage::{AgentFilter, AgentRepo, LedgerRepo, UserRepo};
use std::sync::Arc;
use uuid::Uuid;

/// Attempts at sampling an unused agent id before giving up. At 50 bits
/// of randomness per sample, reaching this limit means the id space for
/// the namespace is effectively exhausted or storage is lying.
const AGENT_ID_SAMPLE_ATTEMPTS: usize = 64;

/// Orchestrates register → activate → lifecycle over the repositories.
pub struct AgentService {
    agents: Arc<dyn AgentRepo>,
    ledger: Arc<dyn LedgerRepo>,
    users: Arc<dyn UserRepo>,
    dns: Arc<DnsVerifier>,
    cert_issuer: CertIssuer,
    tokens: Arc<TokenIssuer>,
    bus: EventBus,
    config: RegistryConfig,
}

impl AgentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Arc<dyn AgentRepo>,
        ledger: Arc<dyn LedgerRepo>,
        users: Arc<dyn UserRepo>,
        dns: Arc<DnsVerifier>,
        cert_issuer: CertIssuer,
        tokens: Arc<TokenIssuer>,
        bus: EventBus,
        config: RegistryConfig,
    ) -> Self {
        AgentService {
            agents,
            ledger,
            users,
            dns,
            cert_issuer,
            tokens,
            bus,
            config,
        }
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// Find an agent by internal UUID or external `agent_...` id.
    pub async fn find(&self, id_ref: &str) -> ApiResult<Agent> {
        if let Ok(uuid) = id_ref.parse::<Uuid>() {
            if let Some(agent) = self.agents.agent_get(uuid).await? {
                return Ok(agent);
            }
        } else if let Ok(agent_id) = AgentId::parse(id_ref) {
            if let Some(agent) = self.agents.agent_get_by_agent_id(&agent_id).await? {
                return Ok(agent);
            }
        }
        Err(ApiError::agent_not_found(id_ref))
    }

    /// Filtered listing.
    pub async fn list(&self, filter: &AgentFilter) -> ApiResult<Vec<Agent>> {
        Ok(self.agents.agent_list(filter).await?)
    }

    pub async fn list_by_owner_domain(&self, domain: &str) -> ApiResult<Vec<Agent>> {
        Ok(self.agents.agent_list_by_owner_domain(domain).await?)
    }

    pub async fn list_by_owner_user(&self, user_id: Uuid) -> ApiResult<Vec<Agent>> {
        Ok(self.agents.agent_list_by_owner_user(user_id).await?)
    }

    // ========================================================================
    // REGISTER
    // ========================================================================

    /// The pre-registration pipeline: validate → threat-screen → derive
    /// the URI → enforce quota → sample an id → persist `pending` →
    /// ledger.
    ///
    /// Hosted registrations require `user`; the submitted `username` is
    /// never consulted for naming, which is the impersonation defense.
    pub async fn register(
        &self,
        req: RegisterAgentRequest,
        user: Option<&UserClaims>,
    ) -> ApiResult<(Agent, ThreatReport)> {
        require_non_empty("display_name", &req.display_name)?;
        require_non_empty("capability", &req.capability)?;
        require_non_empty("endpoint", &req.endpoint)?;

        validate_endpoint(&req.endpoint, self.config.require_https)?;

        let report = score_registration(
            &req.display_name,
            &req.description,
            &req.endpoint,
            &req.capability,
        );
        if report.rejected {
            return Err(RegistryError::ThreatRejected { report }.into());
        }

        let capability_node = CapabilityNode::parse(&req.capability).map_err(ApiError::from)?;

        let (registration_type, trust_root, owner_domain, owner_user_id) =
            match (&req.owner_domain, user) {
                (Some(domain), _) => {
                    let root = TrustRoot::parse(domain).map_err(ApiError::from)?;
                    let domain = match root.domain() {
                        Some(d) => d.to_string(),
                        // "nap" parses as the hosted root and is not a
                        // registrable owner domain.
                        None => {
                            return Err(ApiError::invalid_input(
                                "owner_domain must be a fully qualified domain name",
                            ));
                        }
                    };
                    (RegistrationType::Domain, root, Some(domain), None)
                }
                (None, Some(claims)) => (
                    RegistrationType::NapHosted,
                    TrustRoot::Hosted,
                    None,
                    Some(claims.user_id),
                ),
                (None, None) => {
                    return Err(ApiError::unauthorized(
                        "hosted registration requires a user token; domain registration requires owner_domain",
                    ));
                }
            };

        if let (RegistrationType::NapHosted, Some(user_id)) = (registration_type, owner_user_id) {
            let owned = self
                .agents
                .agent_count_non_revoked_by_owner_user(user_id)
                .await?;
            if owned >= self.config.max_agents_per_user {
                return Err(RegistryError::QuotaExceeded {
                    limit: self.config.max_agents_per_user,
                }
                .into());
            }
        }

        let agent_id = self
            .sample_agent_id(&trust_root, &capability_node)
            .await?;

        let now = Utc::now();
        let agent = Agent {
            id: Uuid::now_v7(),
            agent_id,
            trust_root,
            capability_node,
            registration_type,
            status: AgentStatus::Pending,
            endpoint: req.endpoint,
            display_name: req.display_name,
            description: req.description,
            tags: req.tags,
            skills: req.skills,
            mcp_tools: req.mcp_tools,
            metadata: req.metadata,
            owner_domain,
            owner_user_id,
            cert_serial: None,
            public_key_pem: None,
            suspended_at: None,
            deprecated_at: None,
            sunset_date: None,
            replacement_uri: None,
            revocation_reason: None,
            revoked_at: None,
            health_status: HealthState::Unknown,
            last_seen_at: None,
            support_url: req.support_url,
            version: req.version,
            cert_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        self.agents.agent_create(&agent).await?;

        let uri = agent.uri().to_string();
        let actor = registration_actor(&agent);
        self.ledger
            .ledger_append(
                LedgerAction::Register,
                &uri,
                &actor,
                serde_json::json!({
                    "agent_id": agent.agent_id.as_str(),
                    "registration_type": agent.registration_type,
                    "capability_node": agent.capability_node,
                    "threat_score": report.score,
                }),
            )
            .await?;

        self.bus.publish(RegistryEvent::AgentRegistered {
            agent_uri: uri.clone(),
            threat_score: report.score,
        });
        tracing::info!(agent_uri = %uri, threat_score = report.score, "Agent registered");

        Ok((agent, report))
    }

    /// Rejection-sample an id until the namespace triple is free.
    async fn sample_agent_id(
        &self,
        trust_root: &TrustRoot,
        capability_node: &CapabilityNode,
    ) -> ApiResult<AgentId> {
        use rand::Rng;

        for _ in 0..AGENT_ID_SAMPLE_ATTEMPTS {
            let suffix: String = {
                let mut rng = rand::thread_rng();
                (0..AGENT_ID_RANDOM_LEN)
                    .map(|_| AGENT_ID_ALPHABET[rng.gen_range(0..AGENT_ID_ALPHABET.len())] as char)
                    .collect()
            };
            let candidate = AgentId::from_suffix(&suffix).map_err(ApiError::from)?;
            if !self
                .agents
                .agent_triple_exists(trust_root, capability_node, &candidate)
                .await?
            {
                return Ok(candidate);
            }
        }
        Err(ApiError::internal_error(
            "could not allocate a free agent id",
        ))
    }

    // ========================================================================
    // ACTIVATE
    // ========================================================================

    /// Gate on ownership verification, issue the certificate and return
    /// the once-only bundle. A second activation is not idempotent: the
    /// pending→active edge has already been consumed, so it conflicts.
    pub async fn activate(&self, id_ref: &str) -> ApiResult<ActivateAgentResponse> {
        let agent = self.find(id_ref).await?;
        if !agent.status.can_transition_to(AgentStatus::Active)
            || agent.status != AgentStatus::Pending
        {
            return Err(RegistryError::InvalidTransition {
                from: agent.status,
                to: AgentStatus::Active,
            }
            .into());
        }

        // The verification gate differs by tier; the certificate must
        // never assert an unverified identity.
        let verified_email = match agent.registration_type {
            RegistrationType::Domain => {
                let domain = agent.owner_domain.as_deref().ok_or_else(|| {
                    ApiError::internal_error("domain agent without owner_domain")
                })?;
                if !self.dns.is_domain_verified(domain).await? {
                    return Err(RegistryError::VerificationFailed {
                        domain: domain.to_string(),
                        reason: "domain ownership has not been verified".to_string(),
                    }
                    .into());
                }
                None
            }
            RegistrationType::NapHosted => {
                let user_id = agent.owner_user_id.ok_or_else(|| {
                    ApiError::internal_error("hosted agent without owner_user_id")
                })?;
                if !self.users.user_is_email_verified(user_id).await? {
                    return Err(RegistryError::VerificationFailed {
                        domain: "account email".to_string(),
                        reason: "owner email has not been verified".to_string(),
                    }
                    .into());
                }
                Some(self.users.user_email(user_id).await?.ok_or_else(|| {
                    ApiError::internal_error("verified user has no email on record")
                })?)
            }
        };

        let issued = self
            .cert_issuer
            .issue(&agent, verified_email.as_deref())
            .map_err(|e| ApiError::from(RegistryError::from(e)))?;

        let mut activated = agent.clone();
        activated.status = AgentStatus::Active;
        activated.cert_serial = Some(issued.serial.clone());
        activated.public_key_pem = Some(issued.public_key_pem.clone());
        activated.cert_expires_at = Some(issued.expires_at);
        activated.updated_at = Utc::now();

        self.commit_transition(&activated, AgentStatus::Pending).await?;

        let uri = activated.uri().to_string();
        self.ledger
            .ledger_append(
                LedgerAction::Activate,
                &uri,
                &registration_actor(&activated),
                serde_json::json!({
                    "cert_serial": issued.serial,
                    "trust_tier": activated.trust_tier(),
                }),
            )
            .await?;

        let endorsement_jwt = self
            .tokens
            .issue_endorsement(&activated)
            .map_err(|e| ApiError::from(RegistryError::from(e)))?;
        let task_token = self
            .tokens
            .issue_task_token(&uri, vec![auth::SCOPE_AGENT_MANAGE.to_string()])
            .map_err(|e| ApiError::from(RegistryError::from(e)))?;
        let agent_card = AgentCard::for_agent(
            &activated,
            &self.config.registry_url,
            Some(endorsement_jwt.clone()),
        );
        let mcp_manifest = McpManifest::for_agent(&activated);

        self.bus.publish(RegistryEvent::AgentActivated {
            agent_uri: uri.clone(),
            cert_serial: issued.serial.clone(),
            trust_tier: activated.trust_tier().to_string(),
        });
        tracing::info!(agent_uri = %uri, cert_serial = %issued.serial, "Agent activated");

        Ok(ActivateAgentResponse {
            agent: activated.into(),
            certificate_pem: issued.cert_pem,
            private_key_pem: issued.private_key_pem,
            ca_pem: issued.ca_pem,
            cert_serial: issued.serial,
            cert_expires_at: issued.expires_at,
            endorsement_jwt,
            task_token,
            agent_card,
            mcp_manifest,
        })
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Patch mutable fields. Identity fields are not representable in the
    /// patch type; terminal statuses reject any edit.
    pub async fn update(
        &self,
        id_ref: &str,
        patch: AgentUpdate,
        ctx: &AuthContext,
    ) -> ApiResult<Agent> {
        let mut agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;

        if agent.status.is_terminal() {
            return Err(ApiError::new(
                ErrorCode::InvalidTransition,
                format!("a {} agent cannot be updated", agent.status),
            ));
        }
        if let Some(endpoint) = &patch.endpoint {
            validate_endpoint(endpoint, self.config.require_https)?;
        }
        if patch.is_empty() {
            return Ok(agent);
        }

        patch.apply(&mut agent, Utc::now());
        self.agents.agent_update(&agent).await?;
        Ok(agent)
    }

    // ========================================================================
    // LIFECYCLE TRANSITIONS
    // ========================================================================

    pub async fn suspend(&self, id_ref: &str, ctx: &AuthContext) -> ApiResult<Agent> {
        let agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;
        let now = Utc::now();
        self.transition(
            agent,
            AgentStatus::Suspended,
            |a| a.suspended_at = Some(now),
            LedgerAction::Suspend,
            ctx.actor(),
            serde_json::json!({}),
            |uri| RegistryEvent::AgentSuspended { agent_uri: uri },
        )
        .await
    }

    pub async fn restore(&self, id_ref: &str, ctx: &AuthContext) -> ApiResult<Agent> {
        let agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;
        // Pending→active is also a legal edge, but it belongs to
        // activation with its verification gate; restore only reopens
        // suspensions.
        if agent.status != AgentStatus::Suspended {
            return Err(RegistryError::InvalidTransition {
                from: agent.status,
                to: AgentStatus::Active,
            }
            .into());
        }
        self.transition(
            agent,
            AgentStatus::Active,
            |a| a.suspended_at = None,
            LedgerAction::Restore,
            ctx.actor(),
            serde_json::json!({}),
            |uri| RegistryEvent::AgentRestored { agent_uri: uri },
        )
        .await
    }

    pub async fn deprecate(
        &self,
        id_ref: &str,
        req: DeprecateAgentRequest,
        ctx: &AuthContext,
    ) -> ApiResult<Agent> {
        let agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;

        if let Some(replacement) = &req.replacement_uri {
            AgentUri::parse(replacement).map_err(ApiError::from)?;
        }
        let now = Utc::now();
        let sunset_date = req.sunset_date;
        let replacement_uri = req.replacement_uri.clone();
        self.transition(
            agent,
            AgentStatus::Deprecated,
            move |a| {
                a.deprecated_at = Some(now);
                a.sunset_date = sunset_date;
                a.replacement_uri = replacement_uri;
            },
            LedgerAction::Deprecate,
            ctx.actor(),
            serde_json::json!({
                "sunset_date": req.sunset_date,
                "replacement_uri": req.replacement_uri,
            }),
            move |uri| RegistryEvent::AgentDeprecated {
                agent_uri: uri,
                sunset_date: req.sunset_date,
                replacement_uri: req.replacement_uri,
            },
        )
        .await
    }

    pub async fn revoke(
        &self,
        id_ref: &str,
        reason: String,
        ctx: &AuthContext,
    ) -> ApiResult<Agent> {
        require_non_empty("reason", &reason)?;
        let agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;

        let now = Utc::now();
        let reason_for_record = reason.clone();
        let reason_for_event = reason.clone();
        self.transition(
            agent,
            AgentStatus::Revoked,
            move |a| {
                a.revocation_reason = Some(reason_for_record);
                a.revoked_at = Some(now);
            },
            LedgerAction::Revoke,
            ctx.actor(),
            serde_json::json!({ "reason": reason }),
            move |uri| RegistryEvent::AgentRevoked {
                agent_uri: uri,
                reason: reason_for_event,
            },
        )
        .await
    }

    /// Shared CAS transition: check legality against the load-time
    /// status, write guarded by it, and treat a lost race as whatever the
    /// fresh status makes of the requested edge.
    async fn transition(
        &self,
        agent: Agent,
        to: AgentStatus,
        mutate: impl FnOnce(&mut Agent),
        action: LedgerAction,
        actor: String,
        payload: serde_json::Value,
        event: impl FnOnce(String) -> RegistryEvent,
    ) -> ApiResult<Agent> {
        let from = agent.status;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition { from, to }.into());
        }

        let mut updated = agent;
        updated.status = to;
        mutate(&mut updated);
        updated.updated_at = Utc::now();

        self.commit_transition(&updated, from).await?;

        let uri = updated.uri().to_string();
        self.ledger
            .ledger_append(action, &uri, &actor, payload)
            .await?;
        self.bus.publish(event(uri.clone()));
        tracing::info!(agent_uri = %uri, from = %from, to = %to, "Agent status transition");

        Ok(updated)
    }

    /// CAS write; on a lost race, re-read and surface the edge that now
    /// applies (almost always an illegal transition conflict).
    async fn commit_transition(&self, updated: &Agent, expected: AgentStatus) -> ApiResult<()> {
        if self
            .agents
            .agent_update_status_cas(updated, expected)
            .await?
        {
            return Ok(());
        }
        let fresh = self
            .agents
            .agent_get(updated.id)
            .await?
            .ok_or_else(|| ApiError::agent_not_found(updated.id))?;
        Err(RegistryError::InvalidTransition {
            from: fresh.status,
            to: updated.status,
        }
        .into())
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Permanent removal: a terminal ledger entry, then the row is gone.
    pub async fn delete(&self, id_ref: &str, ctx: &AuthContext) -> ApiResult<()> {
        let agent = self.find(id_ref).await?;
        if !auth::may_delete_agent(ctx, &agent) {
            return Err(ApiError::forbidden(
                "deletion requires the agent's own token or an admin scope",
            ));
        }

        let uri = agent.uri().to_string();
        self.ledger
            .ledger_append(
                LedgerAction::Delete,
                &uri,
                &ctx.actor(),
                serde_json::json!({ "status_at_delete": agent.status }),
            )
            .await?;
        self.agents.agent_delete(agent.id).await?;

        self.bus
            .publish(RegistryEvent::AgentDeleted { agent_uri: uri.clone() });
        tracing::info!(agent_uri = %uri, "Agent deleted");
        Ok(())
    }

    // ========================================================================
    // TOKENS / CRL / EXPIRY
    // ========================================================================

    /// Mint a fresh scoped task token for an active agent.
    pub async fn mint_task_token(
        &self,
        id_ref: &str,
        ctx: &AuthContext,
    ) -> ApiResult<TaskTokenResponse> {
        let agent = self.find(id_ref).await?;
        auth::require_manage(ctx, &agent)?;
        if agent.status != AgentStatus::Active {
            return Err(ApiError::invalid_input(
                "task tokens are only minted for active agents",
            ));
        }

        let scopes = vec![auth::SCOPE_AGENT_MANAGE.to_string()];
        let token = self
            .tokens
            .issue_task_token(&agent.uri().to_string(), scopes.clone())
            .map_err(|e| ApiError::from(RegistryError::from(e)))?;
        Ok(TaskTokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in_secs: nexus_pki::TASK_TOKEN_TTL_SECS,
            scopes,
        })
    }

    /// The public certificate revocation list.
    pub async fn crl(&self) -> ApiResult<CrlResponse> {
        let revoked = self.agents.agent_list_revoked().await?;
        Ok(CrlResponse {
            entries: revoked
                .into_iter()
                .map(|a| CrlEntry {
                    cert_serial: a.cert_serial.unwrap_or_default(),
                    reason: a.revocation_reason,
                    revoked_at: a.revoked_at,
                })
                .collect(),
            generated_at: Utc::now(),
        })
    }

    /// Background sweep: agents whose certificate validity lapsed while
    /// `active` or `deprecated` become `expired`. A status write only; no
    /// ledger action is defined for expiry.
    pub async fn expire_lapsed(&self) -> ApiResult<u32> {
        let now = Utc::now();
        let lapsed = self.agents.agent_list_expirable(now).await?;
        let mut expired = 0;
        for agent in lapsed {
            let from = agent.status;
            if !from.can_transition_to(AgentStatus::Expired) {
                continue;
            }
            let mut updated = agent;
            updated.status = AgentStatus::Expired;
            updated.updated_at = now;
            if self.agents.agent_update_status_cas(&updated, from).await? {
                expired += 1;
                tracing::info!(agent_uri = %updated.uri(), "Agent certificate expired");
            }
        }
        Ok(expired)
    }
}

/// Ledger actor string for self-service registration flows.
fn registration_actor(agent: &Agent) -> String {
    match (&agent.owner_domain, agent.owner_user_id) {
        (Some(domain), _) => domain.clone(),
        (None, Some(user_id)) => format!("user:{}", user_id),
        (None, None) => nexus_core::SYSTEM_ACTOR.to_string(),
    }
}

/// Spawn the periodic certificate-expiry sweep.
pub fn spawn_expiry_sweep(
    service: Arc<AgentService>,
    interval: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.expire_lapsed().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(expired = n, "Expiry sweep transitioned agents"),
                        Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Expiry sweep stopping");
                    break;
                }
            }
        }
    })
}
