//! Resolution DTOs.

use chrono::{DateTime, Utc};
use nexus_core::{AgentStatus, TrustTier};
use serde::{Deserialize, Serialize};

/// Maximum URIs accepted by one batch resolve request.
pub const MAX_BATCH_RESOLVE: usize = 100;

/// Query parameters for single resolve.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct ResolveQuery {
    pub uri: String,
}

/// Deprecation metadata attached to resolutions of deprecated agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeprecationInfo {
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub sunset_date: Option<DateTime<Utc>>,
    pub replacement_uri: Option<String>,
}

/// A successful resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResolveResponse {
    pub uri: String,
    pub endpoint: String,
    pub status: AgentStatus,
    pub trust_tier: TrustTier,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<DeprecationInfo>,
}

/// Body for batch resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchResolveRequest {
    pub uris: Vec<String>,
}

/// One item of a batch result; items succeed or fail independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchResolveItem {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch resolve result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchResolveResponse {
    pub results: Vec<BatchResolveItem>,
    pub count: usize,
}
