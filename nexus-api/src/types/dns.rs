//! DNS-01 challenge DTOs.

use chrono::{DateTime, Utc};
use nexus_core::DnsChallenge;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body for starting a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StartChallengeRequest {
    pub domain: String,
}

/// A challenge as returned to the requester. The TXT record value is only
/// useful to whoever controls the domain's DNS, so it is safe to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChallengeResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
    pub domain: String,
    pub txt_host: String,
    pub txt_record: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}

impl From<DnsChallenge> for ChallengeResponse {
    fn from(c: DnsChallenge) -> Self {
        ChallengeResponse {
            id: c.id,
            domain: c.domain,
            txt_host: c.txt_host,
            txt_record: c.txt_record,
            expires_at: c.expires_at,
            verified: c.verified,
        }
    }
}

/// Result of a verification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VerifyChallengeResponse {
    pub verified: bool,
    pub domain: String,
}
