//! Append-only hash-chained trust ledger entries.
//!
//! Every lifecycle event in the registry lands here: entry N's `prev_hash`
//! is entry N-1's `hash`, and each hash covers the entry's own canonical
//! byte encoding. Entry 0 is a fixed genesis with an all-zero `prev_hash`.
//!
//! The hashed preimage is length-prefixed: for each field in the order
//! `index, prev_hash, action, agent_uri, actor, timestamp, payload`, an
//! 8-byte big-endian length is written followed by the field's bytes.
//! `index` contributes its 8-byte big-endian encoding, `prev_hash` its raw
//! 32 bytes, `timestamp` its RFC 3339 rendering with microsecond precision,
//! and `payload` its compact JSON serialization. The encoding is pinned by
//! tests; the on-disk JSON representation is richer than the preimage.

use crate::{RegistryError, RegistryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// `prev_hash` of the genesis entry: 32 zero bytes, hex-encoded.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Actor string recorded on entries written by the registry itself.
pub const SYSTEM_ACTOR: &str = "system";

// ============================================================================
// ACTIONS
// ============================================================================

/// Lifecycle action recorded by a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// Fixed first entry of every chain.
    Genesis,
    Register,
    Activate,
    Suspend,
    Restore,
    Deprecate,
    Revoke,
    /// Terminal entry written by the explicit delete operation.
    Delete,
    HealthDegraded,
    HealthRecovered,
}

impl LedgerAction {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LedgerAction::Genesis => "genesis",
            LedgerAction::Register => "register",
            LedgerAction::Activate => "activate",
            LedgerAction::Suspend => "suspend",
            LedgerAction::Restore => "restore",
            LedgerAction::Deprecate => "deprecate",
            LedgerAction::Revoke => "revoke",
            LedgerAction::Delete => "delete",
            LedgerAction::HealthDegraded => "health_degraded",
            LedgerAction::HealthRecovered => "health_recovered",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> RegistryResult<Self> {
        match s {
            "genesis" => Ok(LedgerAction::Genesis),
            "register" => Ok(LedgerAction::Register),
            "activate" => Ok(LedgerAction::Activate),
            "suspend" => Ok(LedgerAction::Suspend),
            "restore" => Ok(LedgerAction::Restore),
            "deprecate" => Ok(LedgerAction::Deprecate),
            "revoke" => Ok(LedgerAction::Revoke),
            "delete" => Ok(LedgerAction::Delete),
            "health_degraded" => Ok(LedgerAction::HealthDegraded),
            "health_recovered" => Ok(LedgerAction::HealthRecovered),
            _ => Err(RegistryError::validation(
                "action",
                format!("unknown ledger action {:?}", s),
            )),
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for LedgerAction {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// One immutable link of the trust ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerEntry {
    /// Position in the chain, starting at 0 (genesis).
    pub index: u64,
    /// Hex hash of the previous entry, or [`ZERO_HASH`] for genesis.
    pub prev_hash: String,
    pub action: LedgerAction,
    /// URI of the agent the event concerns; empty for genesis.
    pub agent_uri: String,
    /// Who caused the event: an owner identity or [`SYSTEM_ACTOR`].
    pub actor: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: DateTime<Utc>,
    /// Event-specific details, hashed in compact JSON form.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: serde_json::Value,
    /// SHA-256 of this entry's canonical encoding, hex.
    pub hash: String,
}

impl LedgerEntry {
    /// Build the fixed genesis entry.
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        let mut entry = LedgerEntry {
            index: 0,
            prev_hash: ZERO_HASH.to_string(),
            action: LedgerAction::Genesis,
            agent_uri: String::new(),
            actor: SYSTEM_ACTOR.to_string(),
            timestamp,
            payload: serde_json::json!({
                "event": "genesis",
                "registry": "nexus-agent-registry",
            }),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Build the entry that follows `prev` in the chain.
    pub fn next(
        prev: &LedgerEntry,
        action: LedgerAction,
        agent_uri: impl Into<String>,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        let mut entry = LedgerEntry {
            index: prev.index + 1,
            prev_hash: prev.hash.clone(),
            action,
            agent_uri: agent_uri.into(),
            actor: actor.into(),
            timestamp,
            payload,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Recompute this entry's hash from its canonical encoding.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        };

        field(&self.index.to_be_bytes());
        // An unparseable prev_hash hashes as its raw string bytes so that
        // verification still terminates with a mismatch instead of a panic.
        match hex::decode(&self.prev_hash) {
            Ok(raw) => field(&raw),
            Err(_) => field(self.prev_hash.as_bytes()),
        }
        field(self.action.as_db_str().as_bytes());
        field(self.agent_uri.as_bytes());
        field(self.actor.as_bytes());
        field(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .as_bytes(),
        );
        field(self.payload.to_string().as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash matches the recomputed one.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

// ============================================================================
// CHAIN VERIFICATION
// ============================================================================

/// Walk a full chain and check genesis shape, per-entry hashes, indices,
/// and back-links. Pure; callers load the entries however they like.
pub fn verify_chain(entries: &[LedgerEntry]) -> RegistryResult<()> {
    let corrupt = |index: u64, reason: String| RegistryError::LedgerCorrupt { index, reason };

    let genesis = entries
        .first()
        .ok_or_else(|| corrupt(0, "ledger has no genesis entry".to_string()))?;
    if genesis.index != 0 || genesis.action != LedgerAction::Genesis {
        return Err(corrupt(0, "entry 0 is not a genesis entry".to_string()));
    }
    if genesis.prev_hash != ZERO_HASH {
        return Err(corrupt(0, "genesis prev_hash is not all zeroes".to_string()));
    }

    for (i, entry) in entries.iter().enumerate() {
        let i = i as u64;
        if entry.index != i {
            return Err(corrupt(
                i,
                format!("expected index {}, found {}", i, entry.index),
            ));
        }
        if !entry.hash_is_valid() {
            return Err(corrupt(i, "stored hash does not match content".to_string()));
        }
        if i > 0 {
            let prev = &entries[(i - 1) as usize];
            if entry.prev_hash != prev.hash {
                return Err(corrupt(i, "prev_hash does not link to parent".to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chain_of(actions: &[LedgerAction]) -> Vec<LedgerEntry> {
        let t0 = Utc::now();
        let mut entries = vec![LedgerEntry::genesis(t0)];
        for (i, action) in actions.iter().enumerate() {
            let next = LedgerEntry::next(
                entries.last().unwrap(),
                *action,
                "agent://acme.com/finance/billing/agent_abcdefgh23",
                "acme.com",
                t0 + chrono::Duration::seconds(i as i64 + 1),
                serde_json::json!({"seq": i}),
            );
            entries.push(next);
        }
        entries
    }

    #[test]
    fn genesis_links_from_zero_hash() {
        let genesis = LedgerEntry::genesis(Utc::now());
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.prev_hash, ZERO_HASH);
        assert!(genesis.hash_is_valid());
    }

    #[test]
    fn lifecycle_chain_verifies() {
        let entries = chain_of(&[
            LedgerAction::Register,
            LedgerAction::Activate,
            LedgerAction::Suspend,
            LedgerAction::Restore,
            LedgerAction::Revoke,
        ]);
        assert!(verify_chain(&entries).is_ok());
    }

    #[test]
    fn payload_mutation_is_detected() {
        let mut entries = chain_of(&[LedgerAction::Register, LedgerAction::Activate]);
        entries[2].payload = serde_json::json!({"seq": 999});
        let err = verify_chain(&entries).unwrap_err();
        assert!(matches!(err, RegistryError::LedgerCorrupt { index: 2, .. }));
    }

    #[test]
    fn broken_back_link_is_detected() {
        let mut entries = chain_of(&[LedgerAction::Register, LedgerAction::Activate]);
        // Rewrite entry 1 in place with a self-consistent hash; entry 2's
        // prev_hash no longer links.
        entries[1].actor = "mallory".to_string();
        entries[1].hash = entries[1].compute_hash();
        let err = verify_chain(&entries).unwrap_err();
        assert!(matches!(err, RegistryError::LedgerCorrupt { index: 2, .. }));
    }

    #[test]
    fn missing_genesis_is_detected() {
        let entries = chain_of(&[LedgerAction::Register]);
        let err = verify_chain(&entries[1..]).unwrap_err();
        assert!(matches!(err, RegistryError::LedgerCorrupt { index: 0, .. }));
    }

    #[test]
    fn hash_preimage_is_pinned() {
        // Pin the canonical encoding with an independent spelling of it: a
        // change to either side would fail verification of existing chains
        // after an upgrade.
        let timestamp = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.000006Z")
            .unwrap()
            .with_timezone(&Utc);
        let genesis = LedgerEntry::genesis(timestamp);
        let entry = LedgerEntry::next(
            &genesis,
            LedgerAction::Register,
            "agent://nap/retail/agent_abcdefgh23",
            "system",
            timestamp,
            serde_json::json!({"status": "pending"}),
        );

        let mut hasher = Sha256::new();
        for bytes in [
            1u64.to_be_bytes().to_vec(),
            hex::decode(&genesis.hash).unwrap(),
            b"register".to_vec(),
            b"agent://nap/retail/agent_abcdefgh23".to_vec(),
            b"system".to_vec(),
            b"2026-01-02T03:04:05.000006Z".to_vec(),
            b"{\"status\":\"pending\"}".to_vec(),
        ] {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(&bytes);
        }
        assert_eq!(entry.hash, hex::encode(hasher.finalize()));
    }

    proptest! {
        #[test]
        fn arbitrary_legal_chains_verify(
            actions in proptest::collection::vec(
                prop_oneof![
                    Just(LedgerAction::Register),
                    Just(LedgerAction::Activate),
                    Just(LedgerAction::Suspend),
                    Just(LedgerAction::Restore),
                    Just(LedgerAction::Deprecate),
                    Just(LedgerAction::Revoke),
                    Just(LedgerAction::HealthDegraded),
                    Just(LedgerAction::HealthRecovered),
                ],
                0..32,
            )
        ) {
            let entries = chain_of(&actions);
            prop_assert_eq!(entries.len(), actions.len() + 1);
            prop_assert!(verify_chain(&entries).is_ok());
        }

        #[test]
        fn single_field_tamper_always_detected(
            idx in 1usize..4,
            tamper in 0u8..3,
        ) {
            let mut entries = chain_of(&[
                LedgerAction::Register,
                LedgerAction::Activate,
                LedgerAction::Revoke,
            ]);
            match tamper {
                0 => entries[idx].actor.push('x'),
                1 => entries[idx].agent_uri.push('x'),
                _ => entries[idx].payload = serde_json::json!({"tampered": true}),
            }
            prop_assert!(verify_chain(&entries).is_err());
        }
    }
}
