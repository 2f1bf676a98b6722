//! `.well-known` discovery endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use nexus_core::{AgentCard, AgentStatus, TrustRoot};
use nexus_storage::AgentFilter;
use serde::Deserialize;

/// GET /.well-known/jwks.json - Token verification keys
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = "Discovery",
    responses(
        (status = 200, description = "RS256 verification key set"),
    )
)]
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tokens.jwks().clone())
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct AgentCardQuery {
    pub domain: String,
}

/// GET /.well-known/agent-card.json?domain=X - Domain discovery card
///
/// Serves the card of the domain's highest-trust active agent, newest
/// first among ties.
#[utoipa::path(
    get,
    path = "/.well-known/agent-card.json",
    tag = "Discovery",
    params(AgentCardQuery),
    responses(
        (status = 200, description = "Discovery card", body = AgentCard),
        (status = 404, description = "No active agent for that domain", body = ApiError),
    )
)]
pub async fn agent_card(
    State(state): State<AppState>,
    Query(query): Query<AgentCardQuery>,
) -> ApiResult<impl IntoResponse> {
    let root = TrustRoot::parse(&query.domain).map_err(ApiError::from)?;
    let filter = AgentFilter {
        trust_root: Some(root),
        status: Some(AgentStatus::Active),
        ..AgentFilter::default()
    };
    let agents = state.agents.list(&filter).await?;

    // Highest tier wins; within a tier, the newest activation.
    let best = agents
        .into_iter()
        .max_by_key(|a| (a.has_been_activated(), a.updated_at))
        .ok_or_else(|| {
            ApiError::agent_not_found(format!("no active agent under {}", query.domain))
        })?;

    let endorsement = state
        .tokens
        .issue_endorsement(&best)
        .map_err(|e| ApiError::from(nexus_core::RegistryError::from(e)))?;
    Ok(Json(AgentCard::for_agent(
        &best,
        &state.config.registry_url,
        Some(endorsement),
    )))
}
