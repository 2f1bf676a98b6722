//! Async repository traits for registry persistence.
//!
//! These contracts are what the service layer programs against.
//! Implementations must provide two serialization guarantees:
//!
//! - [`AgentRepo::agent_update_status_cas`] is an atomic compare-and-set
//!   on `(id, status)`; concurrent lifecycle writers (user operations and
//!   the health prober) rely on it instead of a global lock.
//! - [`LedgerRepo::ledger_append`] is globally serialized: entry N's
//!   `prev_hash` equals entry N-1's `hash` after commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{
    Agent, AgentId, AgentStatus, CapabilityNode, DnsChallenge, HealthState, LedgerAction,
    LedgerEntry, RegistrationType, RegistryResult, TrustRoot, WebhookDelivery,
    WebhookSubscription,
};
use uuid::Uuid;

// ============================================================================
// AGENTS
// ============================================================================

/// Listing filter for agent queries.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub trust_root: Option<TrustRoot>,
    pub registration_type: Option<RegistrationType>,
    /// Substring match on the stored capability path.
    pub capability: Option<String>,
    pub owner_domain: Option<String>,
    pub owner_user_id: Option<Uuid>,
    /// Free-text filter over display name, description and tags.
    pub q: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl AgentFilter {
    /// Default page size when a filter leaves `limit` at zero.
    pub const DEFAULT_LIMIT: usize = 50;

    /// Effective page size.
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit
        }
    }

    /// Whether `agent` passes every set criterion.
    pub fn matches(&self, agent: &Agent) -> bool {
        if let Some(status) = self.status {
            if agent.status != status {
                return false;
            }
        }
        if let Some(root) = &self.trust_root {
            if &agent.trust_root != root {
                return false;
            }
        }
        if let Some(rt) = self.registration_type {
            if agent.registration_type != rt {
                return false;
            }
        }
        if let Some(capability) = &self.capability {
            if !agent
                .capability_node
                .as_storage_str()
                .contains(capability.as_str())
            {
                return false;
            }
        }
        if let Some(domain) = &self.owner_domain {
            if agent.owner_domain.as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if let Some(user_id) = self.owner_user_id {
            if agent.owner_user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(q) = &self.q {
            let q = q.to_ascii_lowercase();
            let hit = agent.display_name.to_ascii_lowercase().contains(&q)
                || agent.description.to_ascii_lowercase().contains(&q)
                || agent
                    .tags
                    .iter()
                    .any(|t| t.to_ascii_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// What the health prober needs to know about an active agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub id: Uuid,
    pub uri: String,
    pub endpoint: String,
    pub health_status: HealthState,
}

/// Agent persistence contract.
#[async_trait]
pub trait AgentRepo: Send + Sync {
    /// Insert a new agent record.
    async fn agent_create(&self, agent: &Agent) -> RegistryResult<()>;

    /// Get by internal id.
    async fn agent_get(&self, id: Uuid) -> RegistryResult<Option<Agent>>;

    /// Get by external id. When the same external id exists under several
    /// namespaces, the oldest record wins.
    async fn agent_get_by_agent_id(&self, agent_id: &AgentId) -> RegistryResult<Option<Agent>>;

    /// Whether the `(trust_root, capability_node, agent_id)` triple is
    /// taken. Used by id rejection sampling at registration.
    async fn agent_triple_exists(
        &self,
        trust_root: &TrustRoot,
        capability_node: &CapabilityNode,
        agent_id: &AgentId,
    ) -> RegistryResult<bool>;

    /// Filtered, paged listing ordered by creation time.
    async fn agent_list(&self, filter: &AgentFilter) -> RegistryResult<Vec<Agent>>;

    async fn agent_list_by_owner_domain(&self, domain: &str) -> RegistryResult<Vec<Agent>>;

    async fn agent_list_by_owner_user(&self, user_id: Uuid) -> RegistryResult<Vec<Agent>>;

    /// Count of the owner's agents in any status except `revoked`;
    /// the free-tier quota denominator.
    async fn agent_count_non_revoked_by_owner_user(&self, user_id: Uuid) -> RegistryResult<u32>;

    /// Write mutable (non-status) fields of an existing record.
    async fn agent_update(&self, agent: &Agent) -> RegistryResult<()>;

    /// Compare-and-set status write: persist `agent` only if the stored
    /// record still has status `expected`. Returns `false` when the guard
    /// fails; the caller re-reads and re-evaluates the transition.
    async fn agent_update_status_cas(
        &self,
        agent: &Agent,
        expected: AgentStatus,
    ) -> RegistryResult<bool>;

    /// Health transition write. Touches only `health_status` and
    /// `last_seen_at`; called exclusively on probe transitions.
    async fn agent_update_health(
        &self,
        id: Uuid,
        health: HealthState,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> RegistryResult<()>;

    /// All `active` agents, as probe targets.
    async fn agent_list_probe_targets(&self) -> RegistryResult<Vec<ProbeTarget>>;

    /// Agents whose certificate validity has lapsed while in a status the
    /// expiry sweep may transition (`active` or `deprecated`).
    async fn agent_list_expirable(&self, now: DateTime<Utc>) -> RegistryResult<Vec<Agent>>;

    /// All revoked agents with a certificate serial, for the CRL.
    async fn agent_list_revoked(&self) -> RegistryResult<Vec<Agent>>;

    /// Permanent delete.
    async fn agent_delete(&self, id: Uuid) -> RegistryResult<()>;
}

// ============================================================================
// DNS CHALLENGES
// ============================================================================

/// DNS-01 challenge persistence contract.
#[async_trait]
pub trait ChallengeRepo: Send + Sync {
    async fn challenge_create(&self, challenge: &DnsChallenge) -> RegistryResult<()>;

    async fn challenge_get(&self, id: Uuid) -> RegistryResult<Option<DnsChallenge>>;

    /// Mark a challenge verified. A no-op on an already-verified row, so
    /// concurrent verifies of the same challenge are safe.
    async fn challenge_mark_verified(&self, id: Uuid) -> RegistryResult<()>;

    /// Newest verified challenge for the exact domain (lowercase), if any.
    async fn challenge_find_verified_by_domain(
        &self,
        domain: &str,
    ) -> RegistryResult<Option<DnsChallenge>>;
}

// ============================================================================
// TRUST LEDGER
// ============================================================================

/// Trust ledger persistence contract.
///
/// Implementations install the genesis entry on first start and serialize
/// appends through a single writer.
#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Append an entry: assigns the next index, links `prev_hash`,
    /// computes the hash, persists, and returns the stored entry.
    async fn ledger_append(
        &self,
        action: LedgerAction,
        agent_uri: &str,
        actor: &str,
        payload: serde_json::Value,
    ) -> RegistryResult<LedgerEntry>;

    async fn ledger_get(&self, index: u64) -> RegistryResult<Option<LedgerEntry>>;

    /// Total entry count, genesis included.
    async fn ledger_len(&self) -> RegistryResult<u64>;

    /// Hash of the last entry.
    async fn ledger_root(&self) -> RegistryResult<Option<String>>;

    /// A page of entries ordered by index.
    async fn ledger_range(&self, offset: u64, limit: u64) -> RegistryResult<Vec<LedgerEntry>>;

    /// Every entry, for full-chain verification.
    async fn ledger_all(&self) -> RegistryResult<Vec<LedgerEntry>>;
}

// ============================================================================
// WEBHOOKS
// ============================================================================

/// Webhook subscription persistence contract.
#[async_trait]
pub trait WebhookRepo: Send + Sync {
    async fn webhook_create(&self, subscription: &WebhookSubscription) -> RegistryResult<()>;

    async fn webhook_get(&self, id: Uuid) -> RegistryResult<Option<WebhookSubscription>>;

    async fn webhook_list_by_owner(
        &self,
        user_id: Uuid,
    ) -> RegistryResult<Vec<WebhookSubscription>>;

    /// Subscriptions whose event list matches `event_type` (or `*`).
    async fn webhook_list_for_event(
        &self,
        event_type: &str,
    ) -> RegistryResult<Vec<WebhookSubscription>>;

    async fn webhook_delete(&self, id: Uuid) -> RegistryResult<()>;

    /// Record the final outcome of a delivery attempt sequence.
    async fn webhook_record_delivery(&self, delivery: &WebhookDelivery) -> RegistryResult<()>;

    /// Recorded outcomes for one subscription, oldest first.
    async fn webhook_list_deliveries(
        &self,
        subscription_id: Uuid,
    ) -> RegistryResult<Vec<WebhookDelivery>>;
}

// ============================================================================
// USERS
// ============================================================================

/// The slice of the user store the registry core consumes. Signup,
/// passwords and OAuth live elsewhere.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// The user's email address, if the user exists.
    async fn user_email(&self, user_id: Uuid) -> RegistryResult<Option<String>>;

    /// Whether the user's email has been verified. Gates hosted-agent
    /// activation.
    async fn user_is_email_verified(&self, user_id: Uuid) -> RegistryResult<bool>;
}
