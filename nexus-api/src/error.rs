//! Error types for the Nexus API layer.
//!
//! Domain errors ([`nexus_core::RegistryError`]) are mapped onto an
//! [`ErrorCode`] with a fixed HTTP status; every error leaves the server
//! as a JSON body with a consistent shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nexus_core::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    /// Authentication token is invalid, expired or malformed
    InvalidToken,

    // ========================================================================
    // Validation errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// DNS verification did not find the expected TXT record
    VerificationFailed,

    // ========================================================================
    // Not found errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested agent does not exist
    AgentNotFound,

    /// Requested challenge does not exist
    ChallengeNotFound,

    /// Requested webhook does not exist
    WebhookNotFound,

    /// URI points at an agent whose status does not resolve
    AgentNotResolvable,

    // ========================================================================
    // Conflict errors (409, 410)
    // ========================================================================
    /// Lifecycle transition not permitted from the current status
    InvalidTransition,

    /// Challenge is past its expiry
    ChallengeExpired,

    // ========================================================================
    // Unprocessable (422)
    // ========================================================================
    /// Free-tier agent limit reached
    QuotaExceeded,

    /// Registration rejected by threat screening
    ThreatRejected,

    // ========================================================================
    // Server errors (500, 503)
    // ========================================================================
    /// Certificate issuance failed
    CertIssuanceFailed,

    /// Trust ledger failed verification
    LedgerCorrupt,

    /// Internal server error
    InternalError,

    /// Transient storage or upstream failure
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::VerificationFailed => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::AgentNotFound
            | ErrorCode::ChallengeNotFound
            | ErrorCode::WebhookNotFound
            | ErrorCode::AgentNotResolvable => StatusCode::NOT_FOUND,

            ErrorCode::InvalidTransition => StatusCode::CONFLICT,

            ErrorCode::ChallengeExpired => StatusCode::GONE,

            ErrorCode::QuotaExceeded | ErrorCode::ThreatRejected => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            ErrorCode::CertIssuanceFailed
            | ErrorCode::LedgerCorrupt
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Extra structured context (e.g. the threat report on rejection).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field is missing: {}", field),
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn agent_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::AgentNotFound, format!("Agent not found: {}", id))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        }
        (status, Json(self)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation { .. } => {
                ApiError::new(ErrorCode::ValidationFailed, err.to_string())
            }
            RegistryError::NotFound { entity, .. } => {
                let code = match entity {
                    "Agent" => ErrorCode::AgentNotFound,
                    "Challenge" => ErrorCode::ChallengeNotFound,
                    "Webhook" => ErrorCode::WebhookNotFound,
                    _ => ErrorCode::EntityNotFound,
                };
                ApiError::new(code, err.to_string())
            }
            RegistryError::InvalidTransition { .. } => {
                ApiError::new(ErrorCode::InvalidTransition, err.to_string())
            }
            RegistryError::NotAuthorized { .. } => {
                ApiError::new(ErrorCode::Unauthorized, err.to_string())
            }
            RegistryError::NotResolvable { .. } => {
                ApiError::new(ErrorCode::AgentNotResolvable, err.to_string())
            }
            RegistryError::QuotaExceeded { limit } => ApiError::new(
                ErrorCode::QuotaExceeded,
                format!("agent limit: at most {} non-revoked agents", limit),
            ),
            RegistryError::ThreatRejected { ref report } => {
                let details = serde_json::to_value(report).unwrap_or_default();
                ApiError::new(ErrorCode::ThreatRejected, err.to_string()).with_details(details)
            }
            RegistryError::ChallengeExpired { .. } => {
                ApiError::new(ErrorCode::ChallengeExpired, err.to_string())
            }
            RegistryError::VerificationFailed { .. } => {
                ApiError::new(ErrorCode::VerificationFailed, err.to_string())
            }
            RegistryError::CertIssuanceFailed { .. } => {
                ApiError::new(ErrorCode::CertIssuanceFailed, err.to_string())
            }
            RegistryError::LedgerCorrupt { .. } => {
                ApiError::new(ErrorCode::LedgerCorrupt, err.to_string())
            }
            RegistryError::Transient { .. } => {
                ApiError::new(ErrorCode::ServiceUnavailable, err.to_string())
            }
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
