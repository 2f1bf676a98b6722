//! Trust ledger read-only routes.
//!
//! `GET /ledger/verify` deliberately answers 200 with `valid: false` on a
//! corrupt chain rather than failing: degraded-but-observable beats a
//! silent halt, and corruption must never block unrelated operations.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{LedgerListResponse, LedgerQuery, LedgerVerifyResponse};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use nexus_core::{verify_chain, LedgerEntry, RegistryError};

const DEFAULT_PAGE: u64 = 50;
const MAX_PAGE: u64 = 500;

/// GET /api/v1/ledger - Page through entries
#[utoipa::path(
    get,
    path = "/api/v1/ledger",
    tag = "Ledger",
    params(LedgerQuery),
    responses(
        (status = 200, description = "A page of ledger entries", body = LedgerListResponse),
    )
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<impl IntoResponse> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);

    let entries = state.ledger.ledger_range(offset, limit).await?;
    let total = state.ledger.ledger_len().await?;
    let root = state.ledger.ledger_root().await?;

    Ok(Json(LedgerListResponse {
        entries,
        total,
        root,
    }))
}

/// GET /api/v1/ledger/entries/{index} - Read one entry
#[utoipa::path(
    get,
    path = "/api/v1/ledger/entries/{index}",
    tag = "Ledger",
    params(("index" = u64, Path, description = "Entry index, genesis = 0")),
    responses(
        (status = 200, description = "The entry", body = LedgerEntry),
        (status = 404, description = "No such entry", body = ApiError),
    )
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .ledger
        .ledger_get(index)
        .await?
        .ok_or_else(|| ApiError::from(RegistryError::not_found("LedgerEntry", index)))?;
    Ok(Json(entry))
}

/// GET /api/v1/ledger/verify - Walk and verify the whole chain
#[utoipa::path(
    get,
    path = "/api/v1/ledger/verify",
    tag = "Ledger",
    responses(
        (status = 200, description = "Verification verdict", body = LedgerVerifyResponse),
    )
)]
pub async fn verify(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let entries = state.ledger.ledger_all().await?;
    let length = entries.len() as u64;

    let response = match verify_chain(&entries) {
        Ok(()) => LedgerVerifyResponse {
            valid: true,
            length,
            error: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "Trust ledger failed verification");
            LedgerVerifyResponse {
                valid: false,
                length,
                error: Some(e.to_string()),
            }
        }
    };
    Ok(Json(response))
}

/// GET /api/v1/ledger/root - Hash of the newest entry
#[utoipa::path(
    get,
    path = "/api/v1/ledger/root",
    tag = "Ledger",
    responses(
        (status = 200, description = "Chain head hash"),
    )
)]
pub async fn root(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let root = state.ledger.ledger_root().await?;
    let length = state.ledger.ledger_len().await?;
    Ok(Json(serde_json::json!({ "root": root, "length": length })))
}
