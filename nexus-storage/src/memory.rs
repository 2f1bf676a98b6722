//! In-memory repository implementations.
//!
//! Backed by `tokio::sync` primitives: plain `RwLock` maps for entities,
//! and a `Mutex`-guarded vector for the ledger so appends are serialized
//! through a single writer. Used by the test suite and by single-node
//! deployments that do not need durable storage.

use crate::{AgentFilter, AgentRepo, ChallengeRepo, LedgerRepo, ProbeTarget, UserRepo, WebhookRepo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{
    Agent, AgentId, AgentStatus, CapabilityNode, DnsChallenge, HealthState, LedgerAction,
    LedgerEntry, RegistryError, RegistryResult, TrustRoot, WebhookDelivery, WebhookSubscription,
};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

// ============================================================================
// AGENTS
// ============================================================================

/// In-memory [`AgentRepo`].
#[derive(Default)]
pub struct MemoryAgentRepo {
    agents: RwLock<HashMap<Uuid, Agent>>,
}

impl MemoryAgentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_by_age(mut agents: Vec<Agent>) -> Vec<Agent> {
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        agents
    }
}

#[async_trait]
impl AgentRepo for MemoryAgentRepo {
    async fn agent_create(&self, agent: &Agent) -> RegistryResult<()> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&agent.id) {
            return Err(RegistryError::transient(format!(
                "agent {} already exists",
                agent.id
            )));
        }
        agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn agent_get(&self, id: Uuid) -> RegistryResult<Option<Agent>> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn agent_get_by_agent_id(&self, agent_id: &AgentId) -> RegistryResult<Option<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| &a.agent_id == agent_id)
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches).into_iter().next())
    }

    async fn agent_triple_exists(
        &self,
        trust_root: &TrustRoot,
        capability_node: &CapabilityNode,
        agent_id: &AgentId,
    ) -> RegistryResult<bool> {
        let agents = self.agents.read().await;
        Ok(agents.values().any(|a| {
            &a.trust_root == trust_root
                && &a.capability_node == capability_node
                && &a.agent_id == agent_id
        }))
    }

    async fn agent_list(&self, filter: &AgentFilter) -> RegistryResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches)
            .into_iter()
            .skip(filter.offset)
            .take(filter.effective_limit())
            .collect())
    }

    async fn agent_list_by_owner_domain(&self, domain: &str) -> RegistryResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| a.owner_domain.as_deref() == Some(domain))
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches))
    }

    async fn agent_list_by_owner_user(&self, user_id: Uuid) -> RegistryResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| a.owner_user_id == Some(user_id))
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches))
    }

    async fn agent_count_non_revoked_by_owner_user(&self, user_id: Uuid) -> RegistryResult<u32> {
        let agents = self.agents.read().await;
        Ok(agents
            .values()
            .filter(|a| a.owner_user_id == Some(user_id) && a.status != AgentStatus::Revoked)
            .count() as u32)
    }

    async fn agent_update(&self, agent: &Agent) -> RegistryResult<()> {
        let mut agents = self.agents.write().await;
        match agents.get_mut(&agent.id) {
            // Only the mutable-field group is written; the status group
            // stays whatever concurrent CAS writers have made it.
            Some(stored) => {
                stored.display_name = agent.display_name.clone();
                stored.description = agent.description.clone();
                stored.endpoint = agent.endpoint.clone();
                stored.tags = agent.tags.clone();
                stored.skills = agent.skills.clone();
                stored.mcp_tools = agent.mcp_tools.clone();
                stored.metadata = agent.metadata.clone();
                stored.support_url = agent.support_url.clone();
                stored.version = agent.version.clone();
                stored.updated_at = agent.updated_at;
                Ok(())
            }
            None => Err(RegistryError::not_found("Agent", agent.id)),
        }
    }

    async fn agent_update_status_cas(
        &self,
        agent: &Agent,
        expected: AgentStatus,
    ) -> RegistryResult<bool> {
        let mut agents = self.agents.write().await;
        match agents.get_mut(&agent.id) {
            Some(stored) => {
                if stored.status != expected {
                    return Ok(false);
                }
                *stored = agent.clone();
                Ok(true)
            }
            None => Err(RegistryError::not_found("Agent", agent.id)),
        }
    }

    async fn agent_update_health(
        &self,
        id: Uuid,
        health: HealthState,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> RegistryResult<()> {
        let mut agents = self.agents.write().await;
        match agents.get_mut(&id) {
            Some(stored) => {
                stored.health_status = health;
                if last_seen_at.is_some() {
                    stored.last_seen_at = last_seen_at;
                }
                Ok(())
            }
            None => Err(RegistryError::not_found("Agent", id)),
        }
    }

    async fn agent_list_probe_targets(&self) -> RegistryResult<Vec<ProbeTarget>> {
        let agents = self.agents.read().await;
        Ok(agents
            .values()
            .filter(|a| a.status == AgentStatus::Active)
            .map(|a| ProbeTarget {
                id: a.id,
                uri: a.uri().to_string(),
                endpoint: a.endpoint.clone(),
                health_status: a.health_status,
            })
            .collect())
    }

    async fn agent_list_expirable(&self, now: DateTime<Utc>) -> RegistryResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| {
                matches!(a.status, AgentStatus::Active | AgentStatus::Deprecated)
                    && a.cert_expires_at.is_some_and(|t| t <= now)
            })
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches))
    }

    async fn agent_list_revoked(&self) -> RegistryResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let matches: Vec<Agent> = agents
            .values()
            .filter(|a| a.status == AgentStatus::Revoked && a.cert_serial.is_some())
            .cloned()
            .collect();
        Ok(Self::sorted_by_age(matches))
    }

    async fn agent_delete(&self, id: Uuid) -> RegistryResult<()> {
        let mut agents = self.agents.write().await;
        agents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("Agent", id))
    }
}

// ============================================================================
// DNS CHALLENGES
// ============================================================================

/// In-memory [`ChallengeRepo`].
#[derive(Default)]
pub struct MemoryChallengeRepo {
    challenges: RwLock<HashMap<Uuid, DnsChallenge>>,
}

impl MemoryChallengeRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeRepo for MemoryChallengeRepo {
    async fn challenge_create(&self, challenge: &DnsChallenge) -> RegistryResult<()> {
        self.challenges
            .write()
            .await
            .insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn challenge_get(&self, id: Uuid) -> RegistryResult<Option<DnsChallenge>> {
        Ok(self.challenges.read().await.get(&id).cloned())
    }

    async fn challenge_mark_verified(&self, id: Uuid) -> RegistryResult<()> {
        let mut challenges = self.challenges.write().await;
        match challenges.get_mut(&id) {
            // Already-verified rows stay verified; losers of a concurrent
            // verify race land here harmlessly.
            Some(stored) => {
                stored.verified = true;
                Ok(())
            }
            None => Err(RegistryError::not_found("Challenge", id)),
        }
    }

    async fn challenge_find_verified_by_domain(
        &self,
        domain: &str,
    ) -> RegistryResult<Option<DnsChallenge>> {
        let domain = domain.to_ascii_lowercase();
        let challenges = self.challenges.read().await;
        Ok(challenges
            .values()
            .filter(|c| c.verified && c.domain == domain)
            .max_by_key(|c| c.created_at)
            .cloned())
    }
}

// ============================================================================
// TRUST LEDGER
// ============================================================================

/// In-memory [`LedgerRepo`]. The `Mutex` is the single-writer
/// serialization point for appends; reads clone out of the same lock.
pub struct MemoryLedgerRepo {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedgerRepo {
    /// Create a ledger with its genesis entry installed.
    pub fn new() -> Self {
        MemoryLedgerRepo {
            entries: Mutex::new(vec![LedgerEntry::genesis(Utc::now())]),
        }
    }

    /// Test support: overwrite a stored entry in place, bypassing hashing,
    /// to simulate on-disk tampering.
    pub async fn overwrite_entry(&self, index: u64, entry: LedgerEntry) {
        let mut entries = self.entries.lock().await;
        if let Some(slot) = entries.get_mut(index as usize) {
            *slot = entry;
        }
    }
}

impl Default for MemoryLedgerRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerRepo for MemoryLedgerRepo {
    async fn ledger_append(
        &self,
        action: LedgerAction,
        agent_uri: &str,
        actor: &str,
        payload: serde_json::Value,
    ) -> RegistryResult<LedgerEntry> {
        let mut entries = self.entries.lock().await;
        let prev = entries
            .last()
            .expect("ledger always holds at least the genesis entry");
        let entry = LedgerEntry::next(prev, action, agent_uri, actor, Utc::now(), payload);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn ledger_get(&self, index: u64) -> RegistryResult<Option<LedgerEntry>> {
        Ok(self.entries.lock().await.get(index as usize).cloned())
    }

    async fn ledger_len(&self) -> RegistryResult<u64> {
        Ok(self.entries.lock().await.len() as u64)
    }

    async fn ledger_root(&self) -> RegistryResult<Option<String>> {
        Ok(self.entries.lock().await.last().map(|e| e.hash.clone()))
    }

    async fn ledger_range(&self, offset: u64, limit: u64) -> RegistryResult<Vec<LedgerEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ledger_all(&self) -> RegistryResult<Vec<LedgerEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}

// ============================================================================
// WEBHOOKS
// ============================================================================

/// In-memory [`WebhookRepo`].
#[derive(Default)]
pub struct MemoryWebhookRepo {
    subscriptions: RwLock<HashMap<Uuid, WebhookSubscription>>,
    deliveries: RwLock<Vec<WebhookDelivery>>,
}

impl MemoryWebhookRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookRepo for MemoryWebhookRepo {
    async fn webhook_create(&self, subscription: &WebhookSubscription) -> RegistryResult<()> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn webhook_get(&self, id: Uuid) -> RegistryResult<Option<WebhookSubscription>> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn webhook_list_by_owner(
        &self,
        user_id: Uuid,
    ) -> RegistryResult<Vec<WebhookSubscription>> {
        let subs = self.subscriptions.read().await;
        let mut matches: Vec<WebhookSubscription> = subs
            .values()
            .filter(|s| s.owner_user_id == user_id)
            .cloned()
            .collect();
        matches.sort_by_key(|s| s.created_at);
        Ok(matches)
    }

    async fn webhook_list_for_event(
        &self,
        event_type: &str,
    ) -> RegistryResult<Vec<WebhookSubscription>> {
        let subs = self.subscriptions.read().await;
        Ok(subs
            .values()
            .filter(|s| s.matches(event_type))
            .cloned()
            .collect())
    }

    async fn webhook_delete(&self, id: Uuid) -> RegistryResult<()> {
        self.subscriptions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("Webhook", id))
    }

    async fn webhook_record_delivery(&self, delivery: &WebhookDelivery) -> RegistryResult<()> {
        self.deliveries.write().await.push(delivery.clone());
        Ok(())
    }

    async fn webhook_list_deliveries(
        &self,
        subscription_id: Uuid,
    ) -> RegistryResult<Vec<WebhookDelivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries
            .iter()
            .filter(|d| d.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone)]
struct StoredUser {
    email: String,
    email_verified: bool,
}

/// In-memory [`UserRepo`] with seeding helpers for tests.
#[derive(Default)]
pub struct MemoryUserRepo {
    users: RwLock<HashMap<Uuid, StoredUser>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record.
    pub async fn insert_user(&self, user_id: Uuid, email: &str, email_verified: bool) {
        self.users.write().await.insert(
            user_id,
            StoredUser {
                email: email.to_string(),
                email_verified,
            },
        );
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn user_email(&self, user_id: Uuid) -> RegistryResult<Option<String>> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .map(|u| u.email.clone()))
    }

    async fn user_is_email_verified(&self, user_id: Uuid) -> RegistryResult<bool> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .is_some_and(|u| u.email_verified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::verify_chain;

    fn sample_agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: Uuid::now_v7(),
            agent_id: AgentId::from_suffix("abcdefgh23").unwrap(),
            trust_root: TrustRoot::Domain("acme.com".to_string()),
            capability_node: CapabilityNode::parse("finance>billing").unwrap(),
            registration_type: nexus_core::RegistrationType::Domain,
            status: AgentStatus::Pending,
            endpoint: "https://agents.acme.com/billing".to_string(),
            display_name: "Billing Agent".to_string(),
            description: String::new(),
            tags: vec![],
            skills: vec![],
            mcp_tools: vec![],
            metadata: None,
            owner_domain: Some("acme.com".to_string()),
            owner_user_id: None,
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
            support_url: None,
            version: None,
            cert_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn cas_rejects_stale_status() {
        let repo = MemoryAgentRepo::new();
        let mut agent = sample_agent();
        repo.agent_create(&agent).await.unwrap();

        agent.status = AgentStatus::Active;
        assert!(repo
            .agent_update_status_cas(&agent, AgentStatus::Pending)
            .await
            .unwrap());

        // A second writer that still believes the agent is pending loses.
        let mut stale = agent.clone();
        stale.status = AgentStatus::Suspended;
        assert!(!repo
            .agent_update_status_cas(&stale, AgentStatus::Pending)
            .await
            .unwrap());

        let stored = repo.agent_get(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn ledger_appends_form_a_verifiable_chain() {
        let repo = MemoryLedgerRepo::new();
        assert_eq!(repo.ledger_len().await.unwrap(), 1);

        let uri = "agent://acme.com/finance/billing/agent_abcdefgh23";
        repo.ledger_append(LedgerAction::Register, uri, "acme.com", serde_json::json!({}))
            .await
            .unwrap();
        let activated = repo
            .ledger_append(LedgerAction::Activate, uri, "acme.com", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(repo.ledger_len().await.unwrap(), 3);
        assert_eq!(repo.ledger_root().await.unwrap(), Some(activated.hash));
        assert!(verify_chain(&repo.ledger_all().await.unwrap()).is_ok());
    }

    #[tokio::test]
    async fn newest_verified_challenge_wins() {
        let repo = MemoryChallengeRepo::new();
        let now = Utc::now();

        let mut older = DnsChallenge::new("acme.com", "nonce-one", now - chrono::Duration::minutes(5));
        older.verified = true;
        let mut newer = DnsChallenge::new("acme.com", "nonce-two", now);
        newer.verified = true;
        let unverified = DnsChallenge::new("acme.com", "nonce-three", now);

        for c in [&older, &newer, &unverified] {
            repo.challenge_create(c).await.unwrap();
        }

        let found = repo
            .challenge_find_verified_by_domain("ACME.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[tokio::test]
    async fn quota_counter_skips_revoked() {
        let repo = MemoryAgentRepo::new();
        let user_id = Uuid::now_v7();

        for i in 0..3 {
            let mut agent = sample_agent();
            agent.id = Uuid::now_v7();
            agent.registration_type = nexus_core::RegistrationType::NapHosted;
            agent.trust_root = TrustRoot::Hosted;
            agent.owner_domain = None;
            agent.owner_user_id = Some(user_id);
            if i == 0 {
                agent.status = AgentStatus::Revoked;
            }
            repo.agent_create(&agent).await.unwrap();
        }

        assert_eq!(
            repo.agent_count_non_revoked_by_owner_user(user_id)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn probe_targets_are_active_only() {
        let repo = MemoryAgentRepo::new();
        let mut active = sample_agent();
        active.status = AgentStatus::Active;
        let pending = sample_agent();
        repo.agent_create(&active).await.unwrap();
        repo.agent_create(&pending).await.unwrap();

        let targets = repo.agent_list_probe_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, active.id);
    }
}
