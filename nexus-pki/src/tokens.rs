//! The three RS256 JWT families and the published JWKS.
//!
//! All families are signed by the CA key and distinguished only by their
//! claim sets:
//!
//! | family      | TTL     | claims beyond std                              |
//! |-------------|---------|------------------------------------------------|
//! | user        | 24 h    | `user_id`, `email`, `username`, `tier`         |
//! | task        | 1 h     | `sub` = agent URI, `scopes[]`                  |
//! | endorsement | 365 d   | `sub` = agent URI, `nap:*` attestation fields  |
//!
//! Tokens of a revoked agent are not invalidated before `exp`; consumers
//! wanting high assurance cross-check the serial against `/crl`.

use crate::{CaManager, PkiError, PkiResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use nexus_core::Agent;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Default user token lifetime: 24 hours.
pub const USER_TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Default task token lifetime: 1 hour.
pub const TASK_TOKEN_TTL_SECS: i64 = 3600;

/// Default endorsement lifetime: 365 days.
pub const ENDORSEMENT_TTL_SECS: i64 = 365 * 24 * 3600;

/// Accepted clock drift when checking `exp`.
const CLOCK_SKEW_SECS: i64 = 60;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for token expiry checks, injected so tests are
/// deterministic and immune to CI clock weirdness.
pub trait TokenClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TokenClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl TokenClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// CLAIM FAMILIES
// ============================================================================

/// Claims of a user-facing token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id, stringly, mirrors `user_id`.
    pub sub: String,
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    /// Account tier label (e.g. `free`).
    pub tier: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a short-lived agent task token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClaims {
    /// The agent URI the token acts as.
    pub sub: String,
    pub scopes: Vec<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl TaskClaims {
    /// Scope containment check.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Claims of the long-lived endorsement embedded in published agent cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsementClaims {
    pub sub: String,
    #[serde(rename = "nap:uri")]
    pub nap_uri: String,
    #[serde(rename = "nap:trust_tier")]
    pub nap_trust_tier: String,
    #[serde(rename = "nap:cert_serial")]
    pub nap_cert_serial: Option<String>,
    #[serde(rename = "nap:registry")]
    pub nap_registry: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

// ============================================================================
// JWKS
// ============================================================================

/// One JSON Web Key derived from the CA public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    /// Modulus, base64url without padding.
    pub n: String,
    /// Public exponent, base64url without padding.
    pub e: String,
}

/// The published key set. One CA key, one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

// ============================================================================
// ISSUER
// ============================================================================

/// Token lifetimes, overridable from configuration.
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub user_secs: i64,
    pub task_secs: i64,
    pub endorsement_secs: i64,
}

impl Default for TokenTtls {
    fn default() -> Self {
        TokenTtls {
            user_secs: USER_TOKEN_TTL_SECS,
            task_secs: TASK_TOKEN_TTL_SECS,
            endorsement_secs: ENDORSEMENT_TTL_SECS,
        }
    }
}

/// Issues and verifies all three token families.
///
/// Verification is pure public-key work and fully concurrent; the issuer
/// is shared behind an `Arc` across request handlers.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    kid: String,
    issuer: String,
    ttls: TokenTtls,
    clock: Arc<dyn TokenClock>,
    jwks: Jwks,
}

impl TokenIssuer {
    /// Build an issuer from the CA key with default TTLs and the system
    /// clock. `issuer` is the registry's base URL, used as `iss`.
    pub fn new(ca: &CaManager, issuer: impl Into<String>) -> PkiResult<Self> {
        Self::with_clock(ca, issuer, TokenTtls::default(), Arc::new(SystemClock))
    }

    /// Fully parameterized constructor; tests inject a [`FixedClock`].
    pub fn with_clock(
        ca: &CaManager,
        issuer: impl Into<String>,
        ttls: TokenTtls,
        clock: Arc<dyn TokenClock>,
    ) -> PkiResult<Self> {
        let encoding_key =
            EncodingKey::from_rsa_pem(ca.key_pem().as_bytes()).map_err(|e| {
                PkiError::KeyEncoding {
                    reason: e.to_string(),
                }
            })?;
        let public_pem = ca
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?;
        let decoding_key =
            DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
                PkiError::KeyEncoding {
                    reason: e.to_string(),
                }
            })?;

        let kid = ca.key_fingerprint()?;
        let jwks = Jwks {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                alg: "RS256".to_string(),
                kid: kid.clone(),
                n: URL_SAFE_NO_PAD.encode(ca.public_key().n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(ca.public_key().e().to_bytes_be()),
            }],
        };

        Ok(TokenIssuer {
            encoding_key,
            decoding_key,
            kid,
            issuer: issuer.into(),
            ttls,
            clock,
            jwks,
        })
    }

    /// The published verification key set.
    pub fn jwks(&self) -> &Jwks {
        &self.jwks
    }

    /// The `iss` value stamped on every token.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header
    }

    fn sign<T: Serialize>(&self, claims: &T) -> PkiResult<String> {
        encode(&self.header(), claims, &self.encoding_key).map_err(|e| PkiError::TokenSigning {
            reason: e.to_string(),
        })
    }

    /// Issue a 24-hour user token.
    pub fn issue_user_token(
        &self,
        user_id: Uuid,
        email: &str,
        username: &str,
        tier: &str,
    ) -> PkiResult<String> {
        let iat = self.clock.now_epoch_secs();
        self.sign(&UserClaims {
            sub: user_id.to_string(),
            user_id,
            email: email.to_string(),
            username: username.to_string(),
            tier: tier.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.ttls.user_secs,
        })
    }

    /// Issue a 1-hour task token for `agent_uri` with the given scopes.
    pub fn issue_task_token(&self, agent_uri: &str, scopes: Vec<String>) -> PkiResult<String> {
        let iat = self.clock.now_epoch_secs();
        self.sign(&TaskClaims {
            sub: agent_uri.to_string(),
            scopes,
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.ttls.task_secs,
        })
    }

    /// Issue the 365-day endorsement embedded in the agent card.
    pub fn issue_endorsement(&self, agent: &Agent) -> PkiResult<String> {
        let iat = self.clock.now_epoch_secs();
        let uri = agent.uri().to_string();
        self.sign(&EndorsementClaims {
            sub: uri.clone(),
            nap_uri: uri,
            nap_trust_tier: agent.trust_tier().to_string(),
            nap_cert_serial: agent.cert_serial.clone(),
            nap_registry: self.issuer.clone(),
            iat,
            iss: self.issuer.clone(),
            exp: iat + self.ttls.endorsement_secs,
        })
    }

    /// Signature + `iss` validation, with `exp` checked against the
    /// injected clock rather than the system clock.
    fn decode_checked<T: DeserializeOwned>(&self, token: &str, exp_of: fn(&T) -> i64) -> PkiResult<T> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = false;

        let data = decode::<T>(token, &self.decoding_key, &validation).map_err(|e| {
            PkiError::TokenInvalid {
                reason: e.to_string(),
            }
        })?;
        let exp = exp_of(&data.claims);
        if self.clock.now_epoch_secs() > exp + CLOCK_SKEW_SECS {
            return Err(PkiError::TokenInvalid {
                reason: "token has expired".to_string(),
            });
        }
        Ok(data.claims)
    }

    /// Verify a user token.
    pub fn verify_user_token(&self, token: &str) -> PkiResult<UserClaims> {
        self.decode_checked(token, |c: &UserClaims| c.exp)
    }

    /// Verify a task token and require every scope in `required_scopes`.
    pub fn verify_task_token(
        &self,
        token: &str,
        required_scopes: &[&str],
    ) -> PkiResult<TaskClaims> {
        let claims: TaskClaims = self.decode_checked(token, |c: &TaskClaims| c.exp)?;
        for scope in required_scopes {
            if !claims.has_scope(scope) {
                return Err(PkiError::TokenInvalid {
                    reason: format!("missing required scope {:?}", scope),
                });
            }
        }
        Ok(claims)
    }

    /// Verify an endorsement.
    pub fn verify_endorsement(&self, token: &str) -> PkiResult<EndorsementClaims> {
        self.decode_checked(token, |c: &EndorsementClaims| c.exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::{
        AgentId, AgentStatus, CapabilityNode, HealthState, RegistrationType, TrustRoot,
    };

    const TEST_BITS: usize = 2048;
    const ISSUER: &str = "https://registry.nexus.test";

    fn token_issuer() -> TokenIssuer {
        let dir = tempfile::tempdir().unwrap();
        let ca = CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();
        TokenIssuer::new(&ca, ISSUER).unwrap()
    }

    fn active_agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: Uuid::now_v7(),
            agent_id: AgentId::from_suffix("abcdefgh23").unwrap(),
            trust_root: TrustRoot::Domain("acme.com".to_string()),
            capability_node: CapabilityNode::parse("finance>billing").unwrap(),
            registration_type: RegistrationType::Domain,
            status: AgentStatus::Active,
            endpoint: "https://agents.acme.com".to_string(),
            display_name: "Billing".to_string(),
            description: String::new(),
            tags: vec![],
            skills: vec![],
            mcp_tools: vec![],
            metadata: None,
            owner_domain: Some("acme.com".to_string()),
            owner_user_id: None,
            cert_serial: Some("ab".repeat(16)),
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

    #[test]
    fn user_token_round_trip() {
        let issuer = token_issuer();
        let user_id = Uuid::now_v7();
        let token = issuer
            .issue_user_token(user_id, "a@example.com", "alice", "free")
            .unwrap();
        let claims = issuer.verify_user_token(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.tier, "free");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, USER_TOKEN_TTL_SECS);
    }

    #[test]
    fn task_token_scope_containment() {
        let issuer = token_issuer();
        let uri = "agent://acme.com/finance/billing/agent_abcdefgh23";
        let token = issuer
            .issue_task_token(uri, vec!["agent:update".to_string(), "agent:read".to_string()])
            .unwrap();

        let claims = issuer.verify_task_token(&token, &["agent:update"]).unwrap();
        assert_eq!(claims.sub, uri);

        let err = issuer.verify_task_token(&token, &["agent:revoke"]).unwrap_err();
        assert!(matches!(err, PkiError::TokenInvalid { .. }));
    }

    #[test]
    fn endorsement_carries_nap_claims() {
        let issuer = token_issuer();
        let agent = active_agent();
        let token = issuer.issue_endorsement(&agent).unwrap();
        let claims = issuer.verify_endorsement(&token).unwrap();
        assert_eq!(claims.nap_uri, agent.uri().to_string());
        assert_eq!(claims.nap_trust_tier, "trusted");
        assert_eq!(claims.nap_cert_serial, agent.cert_serial);
        assert_eq!(claims.nap_registry, ISSUER);
        assert_eq!(claims.exp - claims.iat, ENDORSEMENT_TTL_SECS);
    }

    #[test]
    fn mutated_token_is_rejected() {
        let issuer = token_issuer();
        let token = issuer
            .issue_user_token(Uuid::now_v7(), "a@example.com", "alice", "free")
            .unwrap();

        // Flip one character in the payload segment.
        let mut bytes = token.into_bytes();
        let payload_start = bytes.iter().position(|&b| b == b'.').unwrap() + 1;
        bytes[payload_start] = if bytes[payload_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(issuer.verify_user_token(&tampered).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();
        let past = chrono::Utc::now().timestamp() - 10 * USER_TOKEN_TTL_SECS;
        let backdated = TokenIssuer::with_clock(
            &ca,
            ISSUER,
            TokenTtls::default(),
            Arc::new(FixedClock(past)),
        )
        .unwrap();
        let token = backdated
            .issue_user_token(Uuid::now_v7(), "a@example.com", "alice", "free")
            .unwrap();

        // Same key, current clock: the token is long past exp.
        let current = TokenIssuer::new(&ca, ISSUER).unwrap();
        let err = current.verify_user_token(&token).unwrap_err();
        assert!(matches!(err, PkiError::TokenInvalid { .. }));
    }

    #[test]
    fn wrong_family_is_rejected() {
        let issuer = token_issuer();
        let task = issuer
            .issue_task_token("agent://nap/retail/agent_abcdefgh23", vec![])
            .unwrap();
        // A task token has no user claims; family dispatch fails closed.
        assert!(issuer.verify_user_token(&task).is_err());
    }

    #[test]
    fn jwks_exposes_one_rsa_key() {
        let issuer = token_issuer();
        let jwks = issuer.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.use_, "sig");
        assert!(!key.n.is_empty());
        assert_eq!(key.e, "AQAB");
    }
}
