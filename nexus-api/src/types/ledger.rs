//! Trust ledger DTOs.

use nexus_core::LedgerEntry;
use serde::{Deserialize, Serialize};

/// Query parameters for ledger listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct LedgerQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// A page of ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerListResponse {
    pub entries: Vec<LedgerEntry>,
    /// Total chain length, genesis included.
    pub total: u64,
    /// Hash of the last entry.
    pub root: Option<String>,
}

/// Result of full-chain verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerVerifyResponse {
    pub valid: bool,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
