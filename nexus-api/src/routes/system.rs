//! Registry process health.

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::ServiceHealthResponse;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

/// GET /api/v1/health - Process liveness and basic stats
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "System",
    responses(
        (status = 200, description = "Service health", body = ServiceHealthResponse),
    )
)]
pub async fn health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let ledger_entries = state.ledger.ledger_len().await.unwrap_or(0);
    Ok(Json(ServiceHealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        ledger_entries,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// GET /api/v1/ca - Root certificate PEM, for trust distribution
#[utoipa::path(
    get,
    path = "/api/v1/ca",
    tag = "PKI",
    responses(
        (status = 200, description = "Root CA certificate, PEM", content_type = "application/x-pem-file"),
    )
)]
pub async fn ca_certificate(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "application/x-pem-file")],
        state.ca_pem.clone(),
    )
}
