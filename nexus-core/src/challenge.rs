//! DNS-01 domain-ownership challenge records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// TXT record owner label prepended to the challenged domain.
pub const CHALLENGE_TXT_LABEL: &str = "_nexus-agent-challenge";

/// Prefix of the TXT record value.
pub const CHALLENGE_RECORD_PREFIX: &str = "nexus-agent-challenge=";

/// Challenge lifetime.
pub const CHALLENGE_TTL_MINUTES: i64 = 15;

/// A pending or completed DNS-01 challenge.
///
/// At most one *verified* record per domain is observable through
/// `FindVerifiedByDomain`; older verified rows remain but are logically
/// superseded by the newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DnsChallenge {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
    /// Challenged domain, canonical lowercase.
    pub domain: String,
    /// Owner name of the TXT record to publish:
    /// `_nexus-agent-challenge.<domain>`.
    pub txt_host: String,
    /// Exact TXT record value to publish, nonce included.
    pub txt_record: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}

impl DnsChallenge {
    /// Create a fresh challenge for `domain` with the given nonce.
    ///
    /// The nonce must carry at least 16 bytes of entropy; generation is the
    /// caller's job so that this type stays deterministic.
    pub fn new(domain: &str, nonce: &str, now: DateTime<Utc>) -> Self {
        let domain = domain.trim().to_ascii_lowercase();
        DnsChallenge {
            id: Uuid::now_v7(),
            txt_host: format!("{}.{}", CHALLENGE_TXT_LABEL, domain),
            txt_record: format!("{}{}", CHALLENGE_RECORD_PREFIX, nonce),
            domain,
            created_at: now,
            expires_at: now + Duration::minutes(CHALLENGE_TTL_MINUTES),
            verified: false,
        }
    }

    /// Whether the challenge is past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_host_and_record_shape() {
        let now = Utc::now();
        let challenge = DnsChallenge::new("Acme.COM", "deadbeefdeadbeefdeadbeefdeadbeef", now);
        assert_eq!(challenge.domain, "acme.com");
        assert_eq!(challenge.txt_host, "_nexus-agent-challenge.acme.com");
        assert_eq!(
            challenge.txt_record,
            "nexus-agent-challenge=deadbeefdeadbeefdeadbeefdeadbeef"
        );
        assert!(!challenge.verified);
    }

    #[test]
    fn expiry_window_is_fifteen_minutes() {
        let now = Utc::now();
        let challenge = DnsChallenge::new("acme.com", "n", now);
        assert!(!challenge.is_expired(now));
        assert!(!challenge.is_expired(now + Duration::minutes(14)));
        assert!(challenge.is_expired(now + Duration::minutes(15)));
    }
}
