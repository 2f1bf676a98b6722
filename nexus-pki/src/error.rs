//! Error types for PKI operations.

use nexus_core::RegistryError;
use thiserror::Error;

/// PKI layer errors.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    #[error("Key encoding failed: {reason}")]
    KeyEncoding { reason: String },

    #[error("Certificate build failed: {reason}")]
    CertBuild { reason: String },

    #[error("CA material at {path} could not be read or written: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Token signing failed: {reason}")]
    TokenSigning { reason: String },

    #[error("Token rejected: {reason}")]
    TokenInvalid { reason: String },

    #[error("Hosted agent has no verified email on record")]
    MissingVerifiedEmail,
}

impl From<PkiError> for RegistryError {
    fn from(err: PkiError) -> Self {
        match err {
            PkiError::TokenInvalid { reason } => RegistryError::NotAuthorized { reason },
            other => RegistryError::CertIssuanceFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for PKI operations.
pub type PkiResult<T> = Result<T, PkiError>;
