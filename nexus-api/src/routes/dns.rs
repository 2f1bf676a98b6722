//! DNS-01 challenge routes.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{ChallengeResponse, StartChallengeRequest, VerifyChallengeResponse};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

/// POST /api/v1/dns/challenge - Start a domain-ownership challenge
#[utoipa::path(
    post,
    path = "/api/v1/dns/challenge",
    tag = "DNS",
    request_body = StartChallengeRequest,
    responses(
        (status = 201, description = "Challenge created; publish the TXT record", body = ChallengeResponse),
        (status = 400, description = "Invalid domain", body = ApiError),
    )
)]
pub async fn start_challenge(
    State(state): State<AppState>,
    Json(req): Json<StartChallengeRequest>,
) -> ApiResult<impl IntoResponse> {
    let challenge = state.dns.start_challenge(&req.domain).await?;
    Ok((StatusCode::CREATED, Json(ChallengeResponse::from(challenge))))
}

/// POST /api/v1/dns/challenge/{id}/verify - Look the TXT record up
#[utoipa::path(
    post,
    path = "/api/v1/dns/challenge/{id}/verify",
    tag = "DNS",
    params(("id" = Uuid, Path, description = "Challenge id")),
    responses(
        (status = 200, description = "Domain verified", body = VerifyChallengeResponse),
        (status = 400, description = "TXT record not found yet", body = ApiError),
        (status = 410, description = "Challenge expired", body = ApiError),
    )
)]
pub async fn verify_challenge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let challenge = state.dns.verify_challenge(id).await?;
    Ok(Json(VerifyChallengeResponse {
        verified: challenge.verified,
        domain: challenge.domain,
    }))
}
