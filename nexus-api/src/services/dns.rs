//! DNS-01 domain-ownership verification.
//!
//! A challenge asks the domain holder to publish a nonce under
//! `_nexus-agent-challenge.<domain>`. Verification looks the TXT RRset up
//! and requires the exact record value; a missing record is reported as a
//! verification failure the caller may retry after propagation, never as
//! a server fault.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::Utc;
use nexus_core::{validate_domain, DnsChallenge, RegistryError, RegistryResult};
use nexus_storage::ChallengeRepo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// TXT LOOKUP ABSTRACTION
// ============================================================================

/// TXT record lookup, abstracted so tests can stub DNS.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    /// All TXT record values at `host`. A missing name yields an empty
    /// vector; only transport-level problems are errors.
    async fn txt_records(&self, host: &str) -> RegistryResult<Vec<String>>;
}

/// Production lookup backed by hickory-resolver with system config.
pub struct HickoryTxtLookup {
    resolver: hickory_resolver::TokioResolver,
    timeout: Duration,
}

impl HickoryTxtLookup {
    pub fn new(timeout: Duration) -> RegistryResult<Self> {
        let resolver = hickory_resolver::TokioResolver::builder_tokio()
            .map_err(|e| RegistryError::transient(format!("resolver init failed: {}", e)))?
            .build();
        Ok(HickoryTxtLookup { resolver, timeout })
    }
}

#[async_trait]
impl TxtLookup for HickoryTxtLookup {
    async fn txt_records(&self, host: &str) -> RegistryResult<Vec<String>> {
        let lookup = tokio::time::timeout(self.timeout, self.resolver.txt_lookup(host.to_string()))
            .await
            .map_err(|_| RegistryError::transient(format!("TXT lookup for {} timed out", host)))?;

        match lookup {
            Ok(records) => Ok(records
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                        .collect::<String>()
                })
                .collect()),
            // NXDOMAIN and friends are an empty RRset from the caller's
            // point of view; the record simply is not there yet.
            Err(e) => {
                tracing::debug!(host, error = %e, "TXT lookup returned no records");
                Ok(Vec::new())
            }
        }
    }
}

/// In-memory lookup for tests: a host → records map.
#[derive(Default)]
pub struct StaticTxtLookup {
    records: std::sync::RwLock<HashMap<String, Vec<String>>>,
}

impl StaticTxtLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a TXT record value at `host`.
    pub fn insert(&self, host: &str, value: &str) {
        self.records
            .write()
            .expect("static lookup lock")
            .entry(host.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Drop all records for `host`.
    pub fn remove(&self, host: &str) {
        self.records.write().expect("static lookup lock").remove(host);
    }
}

#[async_trait]
impl TxtLookup for StaticTxtLookup {
    async fn txt_records(&self, host: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .records
            .read()
            .expect("static lookup lock")
            .get(host)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

/// Challenge lifecycle: start, verify, and the `IsDomainVerified` gate
/// consulted at agent activation.
pub struct DnsVerifier {
    challenges: Arc<dyn ChallengeRepo>,
    lookup: Arc<dyn TxtLookup>,
}

impl DnsVerifier {
    pub fn new(challenges: Arc<dyn ChallengeRepo>, lookup: Arc<dyn TxtLookup>) -> Self {
        DnsVerifier { challenges, lookup }
    }

    /// Create and persist a fresh challenge for `domain`.
    pub async fn start_challenge(&self, domain: &str) -> ApiResult<DnsChallenge> {
        let domain = domain.trim().to_ascii_lowercase();
        validate_domain(&domain).map_err(ApiError::from)?;

        let challenge = DnsChallenge::new(&domain, &random_nonce(), Utc::now());
        self.challenges.challenge_create(&challenge).await?;

        tracing::info!(domain = %challenge.domain, challenge_id = %challenge.id, "DNS challenge started");
        Ok(challenge)
    }

    /// Verify a challenge by TXT lookup.
    ///
    /// Idempotent: an already-verified challenge returns success without
    /// a second lookup. Concurrent verifies race harmlessly; the loser's
    /// `MarkVerified` is a no-op.
    pub async fn verify_challenge(&self, id: Uuid) -> ApiResult<DnsChallenge> {
        let mut challenge = self
            .challenges
            .challenge_get(id)
            .await?
            .ok_or_else(|| ApiError::from(RegistryError::not_found("Challenge", id)))?;

        if challenge.verified {
            return Ok(challenge);
        }
        let now = Utc::now();
        if challenge.is_expired(now) {
            return Err(RegistryError::ChallengeExpired {
                id,
                expired_at: challenge.expires_at,
            }
            .into());
        }

        let records = self.lookup.txt_records(&challenge.txt_host).await?;
        if !records.iter().any(|r| r == &challenge.txt_record) {
            return Err(RegistryError::VerificationFailed {
                domain: challenge.domain.clone(),
                reason: "expected TXT record not found; DNS propagation may still be pending"
                    .to_string(),
            }
            .into());
        }

        self.challenges.challenge_mark_verified(id).await?;
        challenge.verified = true;

        tracing::info!(domain = %challenge.domain, challenge_id = %id, "Domain verified");
        Ok(challenge)
    }

    /// Whether `domain` currently holds a non-expired verified challenge.
    ///
    /// Exact-match only: verifying `acme.com` authorizes neither
    /// `app.acme.com` nor vice versa.
    pub async fn is_domain_verified(&self, domain: &str) -> ApiResult<bool> {
        let found = self
            .challenges
            .challenge_find_verified_by_domain(&domain.to_ascii_lowercase())
            .await?;
        Ok(found.is_some_and(|c| !c.is_expired(Utc::now())))
    }
}

/// 16 bytes of entropy, hex-rendered.
fn random_nonce() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use nexus_storage::MemoryChallengeRepo;

    fn verifier() -> (DnsVerifier, Arc<StaticTxtLookup>) {
        let lookup = Arc::new(StaticTxtLookup::new());
        let verifier = DnsVerifier::new(Arc::new(MemoryChallengeRepo::new()), lookup.clone());
        (verifier, lookup)
    }

    #[tokio::test]
    async fn challenge_verifies_when_record_is_published() {
        let (verifier, lookup) = verifier();
        let challenge = verifier.start_challenge("acme.com").await.unwrap();
        assert_eq!(challenge.txt_host, "_nexus-agent-challenge.acme.com");

        // Not published yet: verification fails, retryably.
        let err = verifier.verify_challenge(challenge.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::VerificationFailed);

        lookup.insert(&challenge.txt_host, &challenge.txt_record);
        let verified = verifier.verify_challenge(challenge.id).await.unwrap();
        assert!(verified.verified);
        assert!(verifier.is_domain_verified("acme.com").await.unwrap());
        assert!(verifier.is_domain_verified("ACME.COM").await.unwrap());
    }

    #[tokio::test]
    async fn reverify_is_idempotent_without_lookup() {
        let (verifier, lookup) = verifier();
        let challenge = verifier.start_challenge("acme.com").await.unwrap();
        lookup.insert(&challenge.txt_host, &challenge.txt_record);
        verifier.verify_challenge(challenge.id).await.unwrap();

        // Pull the record; re-verification must still succeed because the
        // stored row is already verified.
        lookup.remove(&challenge.txt_host);
        let again = verifier.verify_challenge(challenge.id).await.unwrap();
        assert!(again.verified);
    }

    #[tokio::test]
    async fn subdomain_verification_is_exact_match() {
        let (verifier, lookup) = verifier();
        let challenge = verifier.start_challenge("acme.com").await.unwrap();
        lookup.insert(&challenge.txt_host, &challenge.txt_record);
        verifier.verify_challenge(challenge.id).await.unwrap();

        assert!(verifier.is_domain_verified("acme.com").await.unwrap());
        assert!(!verifier.is_domain_verified("app.acme.com").await.unwrap());
    }

    #[tokio::test]
    async fn wrong_record_value_fails() {
        let (verifier, lookup) = verifier();
        let challenge = verifier.start_challenge("acme.com").await.unwrap();
        lookup.insert(&challenge.txt_host, "nexus-agent-challenge=wrong-nonce");

        let err = verifier.verify_challenge(challenge.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::VerificationFailed);
    }

    #[tokio::test]
    async fn garbage_domain_is_rejected() {
        let (verifier, _) = verifier();
        assert!(verifier.start_challenge("not a domain").await.is_err());
        assert!(verifier.start_challenge("localhost").await.is_err());
    }
}
