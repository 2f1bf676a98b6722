//! Agent REST API routes.

use crate::auth::{authenticate, authenticate_user, bearer_token};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    ActivateAgentResponse, AgentResponse, CrlResponse, DeprecateAgentRequest, ListAgentsQuery,
    ListAgentsResponse, RegisterAgentRequest, RegisterAgentResponse, RevokeAgentRequest,
    TaskTokenResponse, UpdateAgentRequest,
};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use nexus_core::TrustRoot;

/// POST /api/v1/agents - Register a new agent
///
/// Domain registrations need no auth (activation is gated on DNS
/// verification); hosted registrations require a user token.
#[utoipa::path(
    post,
    path = "/api/v1/agents",
    tag = "Agents",
    request_body = RegisterAgentRequest,
    responses(
        (status = 201, description = "Agent registered as pending", body = RegisterAgentResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 422, description = "Rejected by threat screening or quota", body = ApiError),
    )
)]
pub async fn register_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    // A bearer token, when present, must be a valid user token; hosted
    // registration is rejected inside the service when both it and
    // owner_domain are absent.
    let user = match bearer_token(&headers) {
        Some(_) => Some(authenticate_user(&state.tokens, &headers)?),
        None => None,
    };

    let (agent, threat_report) = state.agents.register(req, user.as_ref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterAgentResponse {
            agent: agent.into(),
            threat_report,
        }),
    ))
}

/// GET /api/v1/agents - List agents with filters
#[utoipa::path(
    get,
    path = "/api/v1/agents",
    tag = "Agents",
    params(ListAgentsQuery),
    responses(
        (status = 200, description = "Filtered agent listing", body = ListAgentsResponse),
    )
)]
pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let trust_root = match &query.trust_root {
        Some(raw) => Some(TrustRoot::parse(raw).map_err(ApiError::from)?),
        None => None,
    };
    let filter = query.into_filter(trust_root);
    let agents = state.agents.list(&filter).await?;

    let agents: Vec<AgentResponse> = agents.into_iter().map(Into::into).collect();
    let total = agents.len();
    Ok(Json(ListAgentsResponse { agents, total }))
}

/// GET /api/v1/agents/{id} - Read one agent
#[utoipa::path(
    get,
    path = "/api/v1/agents/{id}",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 200, description = "Agent record", body = AgentResponse),
        (status = 404, description = "Agent not found", body = ApiError),
    )
)]
pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let agent = state.agents.find(&id).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// POST /api/v1/agents/{id}/activate - Issue the certificate bundle
///
/// Unauthenticated by design: activation is gated on the tier's
/// ownership verification, and the bundle is only produced once because
/// the pending→active edge is consumed with it.
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/activate",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 200, description = "Once-only certificate bundle", body = ActivateAgentResponse),
        (status = 400, description = "Ownership not verified", body = ApiError),
        (status = 409, description = "Not pending", body = ApiError),
    )
)]
pub async fn activate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActivateAgentResponse>> {
    Ok(Json(state.agents.activate(&id).await?))
}

/// PATCH /api/v1/agents/{id} - Update mutable fields
#[utoipa::path(
    patch,
    path = "/api/v1/agents/{id}",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    request_body = UpdateAgentRequest,
    responses(
        (status = 200, description = "Updated agent", body = AgentResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Not the owner", body = ApiError),
    )
)]
pub async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<UpdateAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let agent = state.agents.update(&id, patch, &ctx).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// POST /api/v1/agents/{id}/suspend
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/suspend",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 200, description = "Suspended agent", body = AgentResponse),
        (status = 409, description = "Illegal transition", body = ApiError),
    )
)]
pub async fn suspend_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let agent = state.agents.suspend(&id, &ctx).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// POST /api/v1/agents/{id}/restore
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/restore",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 200, description = "Restored agent", body = AgentResponse),
        (status = 409, description = "Illegal transition", body = ApiError),
    )
)]
pub async fn restore_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let agent = state.agents.restore(&id, &ctx).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// POST /api/v1/agents/{id}/deprecate
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/deprecate",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    request_body = DeprecateAgentRequest,
    responses(
        (status = 200, description = "Deprecated agent", body = AgentResponse),
        (status = 409, description = "Illegal transition", body = ApiError),
    )
)]
pub async fn deprecate_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DeprecateAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let agent = state.agents.deprecate(&id, req, &ctx).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// POST /api/v1/agents/{id}/revoke
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/revoke",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    request_body = RevokeAgentRequest,
    responses(
        (status = 200, description = "Revoked agent", body = AgentResponse),
        (status = 409, description = "Illegal transition", body = ApiError),
    )
)]
pub async fn revoke_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RevokeAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let agent = state.agents.revoke(&id, req.reason, &ctx).await?;
    Ok(Json(AgentResponse::from(agent)))
}

/// DELETE /api/v1/agents/{id} - Permanent delete
#[utoipa::path(
    delete,
    path = "/api/v1/agents/{id}",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 204, description = "Agent deleted"),
        (status = 403, description = "Not permitted", body = ApiError),
    )
)]
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let ctx = authenticate(&state.tokens, &headers)?;
    state.agents.delete(&id, &ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/agents/{id}/token - Mint a fresh task token
#[utoipa::path(
    post,
    path = "/api/v1/agents/{id}/token",
    tag = "Agents",
    params(("id" = String, Path, description = "Internal UUID or external agent id")),
    responses(
        (status = 200, description = "Fresh scoped task token", body = TaskTokenResponse),
        (status = 403, description = "Not the owner", body = ApiError),
    )
)]
pub async fn mint_task_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state.tokens, &headers)?;
    let token = state.agents.mint_task_token(&id, &ctx).await?;
    Ok(Json(token))
}

/// GET /api/v1/crl - Certificate revocation list
#[utoipa::path(
    get,
    path = "/api/v1/crl",
    tag = "PKI",
    responses(
        (status = 200, description = "Revoked certificate serials", body = CrlResponse),
    )
)]
pub async fn get_crl(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.agents.crl().await?))
}
