//! Leaf certificate issuance for activated agents.
//!
//! Issuance is uniform across registration tiers; only the subject and
//! SAN content differ. Domain agents are named by their trust root and
//! carry a DNS SAN; hosted agents are named by their display name and
//! carry the verified email as an RFC 822 SAN. Both carry the permanent
//! `agent://` URI as a URI SAN.
//!
//! The subject private key is generated here, returned to the caller
//! exactly once, and never persisted by the registry.

use crate::{random_serial_bytes, CaManager, PkiError, PkiResult};
use chrono::{DateTime, Duration, Utc};
use nexus_core::{Agent, RegistrationType};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, SanType, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use std::sync::Arc;

/// Leaf certificate validity.
pub const LEAF_VALIDITY_DAYS: i64 = 365;

/// Default modulus size for subject keys.
pub const LEAF_KEY_BITS: usize = 4096;

/// The one-time issuance bundle. `private_key_pem` exists only in this
/// value and in the activation response built from it; there is no
/// `Debug` impl.
#[derive(Clone)]
pub struct IssuedCert {
    pub cert_pem: String,
    pub private_key_pem: String,
    pub ca_pem: String,
    /// 128-bit random serial, lowercase hex.
    pub serial: String,
    pub public_key_pem: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints leaf certificates signed by the [`CaManager`].
pub struct CertIssuer {
    ca: Arc<CaManager>,
    key_bits: usize,
}

impl CertIssuer {
    pub fn new(ca: Arc<CaManager>) -> Self {
        Self {
            ca,
            key_bits: LEAF_KEY_BITS,
        }
    }

    /// Subject key size override for tests.
    pub fn with_key_bits(ca: Arc<CaManager>, key_bits: usize) -> Self {
        Self { ca, key_bits }
    }

    /// Issue a leaf certificate for an agent being activated.
    ///
    /// `verified_email` is required for hosted agents: the certificate
    /// asserts the email SAN, so the caller must have checked email
    /// verification first. Issuance refuses to proceed without one rather
    /// than minting an unverifiable claim.
    pub fn issue(&self, agent: &Agent, verified_email: Option<&str>) -> PkiResult<IssuedCert> {
        let uri = agent.uri().to_string();

        let subject_private =
            RsaPrivateKey::new(&mut rand::rngs::OsRng, self.key_bits).map_err(|e| {
                PkiError::KeyGeneration {
                    reason: e.to_string(),
                }
            })?;
        let private_key_pem = subject_private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?
            .to_string();
        let public_key_pem = subject_private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?;
        let subject_key = KeyPair::from_pem_and_sign_algo(&private_key_pem, &PKCS_RSA_SHA256)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();

        match agent.registration_type {
            RegistrationType::Domain => {
                let trust_root = agent.trust_root.as_str();
                dn.push(DnType::CommonName, trust_root);
                params
                    .subject_alt_names
                    .push(SanType::DnsName(ia5(trust_root)?));
            }
            RegistrationType::NapHosted => {
                let email = verified_email.ok_or(PkiError::MissingVerifiedEmail)?;
                dn.push(DnType::CommonName, agent.display_name.as_str());
                params
                    .subject_alt_names
                    .push(SanType::Rfc822Name(ia5(email)?));
            }
        }
        params.subject_alt_names.push(SanType::URI(ia5(&uri)?));
        params.distinguished_name = dn;

        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let now = Utc::now();
        let expires_at = now + Duration::days(LEAF_VALIDITY_DAYS);
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after =
            time::OffsetDateTime::now_utc() + time::Duration::days(LEAF_VALIDITY_DAYS);

        let serial_bytes = random_serial_bytes();
        let serial = hex::encode(serial_bytes);
        params.serial_number = Some(SerialNumber::from_slice(&serial_bytes));

        let cert_pem = self.ca.sign(params, &subject_key)?;

        tracing::info!(
            agent_uri = %uri,
            serial = %serial,
            "Issued leaf certificate"
        );

        Ok(IssuedCert {
            cert_pem,
            private_key_pem,
            ca_pem: self.ca.cert_pem().to_string(),
            serial,
            public_key_pem,
            expires_at,
        })
    }
}

fn ia5(s: &str) -> PkiResult<Ia5String> {
    Ia5String::try_from(s).map_err(|e| PkiError::CertBuild {
        reason: format!("invalid SAN value {:?}: {}", s, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::{
        AgentId, AgentStatus, CapabilityNode, HealthState, RegistrationType, TrustRoot,
    };
    use uuid::Uuid;

    const TEST_BITS: usize = 2048;

    fn agent(registration_type: RegistrationType) -> Agent {
        let hosted = registration_type == RegistrationType::NapHosted;
        let now = Utc::now();
        Agent {
            id: Uuid::now_v7(),
            agent_id: AgentId::from_suffix("abcdefgh23").unwrap(),
            trust_root: if hosted {
                TrustRoot::Hosted
            } else {
                TrustRoot::Domain("acme.com".to_string())
            },
            capability_node: CapabilityNode::parse("finance>billing").unwrap(),
            registration_type,
            status: AgentStatus::Pending,
            endpoint: "https://agents.acme.com/billing".to_string(),
            display_name: "Billing Agent".to_string(),
            description: String::new(),
            tags: vec![],
            skills: vec![],
            mcp_tools: vec![],
            metadata: None,
            owner_domain: (!hosted).then(|| "acme.com".to_string()),
            owner_user_id: hosted.then(Uuid::now_v7),
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

    fn issuer() -> CertIssuer {
        let dir = tempfile::tempdir().unwrap();
        let ca = CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();
        CertIssuer::with_key_bits(Arc::new(ca), TEST_BITS)
    }

    #[test]
    fn issues_domain_cert_bundle() {
        let issued = issuer().issue(&agent(RegistrationType::Domain), None).unwrap();
        assert!(issued.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.private_key_pem.contains("BEGIN PRIVATE KEY"));
        assert!(issued.ca_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.public_key_pem.contains("BEGIN PUBLIC KEY"));
        assert_eq!(issued.serial.len(), 32);
        assert!(issued.serial.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(issued.expires_at > Utc::now() + Duration::days(364));
    }

    #[test]
    fn hosted_cert_requires_verified_email() {
        let i = issuer();
        let hosted = agent(RegistrationType::NapHosted);

        match i.issue(&hosted, None) {
            Err(err) => assert!(matches!(err, PkiError::MissingVerifiedEmail)),
            Ok(_) => panic!("expected MissingVerifiedEmail error"),
        }

        let issued = i.issue(&hosted, Some("owner@example.com")).unwrap();
        assert!(issued.cert_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn serials_are_unique_per_issue() {
        let i = issuer();
        let a = agent(RegistrationType::Domain);
        let first = i.issue(&a, None).unwrap();
        let second = i.issue(&a, None).unwrap();
        assert_ne!(first.serial, second.serial);
    }
}
