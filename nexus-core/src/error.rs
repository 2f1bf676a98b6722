//! Error types for registry operations.
//!
//! These are domain error kinds, not HTTP codes; the API layer maps each
//! kind onto a status code. Validation failures are fatal for the calling
//! request, state-machine violations surface as conflicts, and transient
//! persistence failures are surfaced without retrying.

use crate::{AgentStatus, ThreatReport};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Master error type for registry operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: AgentStatus, to: AgentStatus },

    #[error("Not authorized: {reason}")]
    NotAuthorized { reason: String },

    #[error("{uri} does not resolve: agent is {status}")]
    NotResolvable { uri: String, status: AgentStatus },

    #[error("Agent limit reached: {limit} non-revoked agents already registered")]
    QuotaExceeded { limit: u32 },

    #[error("Registration rejected by threat screening")]
    ThreatRejected { report: ThreatReport },

    #[error("Challenge {id} expired at {expired_at}")]
    ChallengeExpired {
        id: Uuid,
        expired_at: DateTime<Utc>,
    },

    #[error("Domain verification failed for {domain}: {reason}")]
    VerificationFailed { domain: String, reason: String },

    #[error("Certificate issuance failed: {reason}")]
    CertIssuanceFailed { reason: String },

    #[error("Ledger corrupt at index {index}: {reason}")]
    LedgerCorrupt { index: u64, reason: String },

    #[error("Transient failure: {reason}")]
    Transient { reason: String },
}

impl RegistryError {
    /// Shorthand for a validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RegistryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a transient repository or network failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        RegistryError::Transient {
            reason: reason.into(),
        }
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
