//! Webhook subscription routes. All require a user token.

use crate::auth::authenticate_user;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{CreateWebhookRequest, CreateWebhookResponse, ListWebhooksResponse};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

/// POST /api/v1/webhooks - Create a subscription
///
/// The signing secret is returned here and never again.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    tag = "Webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Subscription created; secret included once", body = CreateWebhookResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "User token required", body = ApiError),
    )
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateWebhookRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = authenticate_user(&state.tokens, &headers)?;
    let (webhook, secret) = state
        .webhooks
        .create_subscription(user.user_id, &req.url, req.events, req.secret)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateWebhookResponse { webhook, secret }),
    ))
}

/// GET /api/v1/webhooks - List the caller's subscriptions
#[utoipa::path(
    get,
    path = "/api/v1/webhooks",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Subscriptions without secrets", body = ListWebhooksResponse),
        (status = 401, description = "User token required", body = ApiError),
    )
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = authenticate_user(&state.tokens, &headers)?;
    let webhooks = state.webhooks.list_subscriptions(user.user_id).await?;
    let total = webhooks.len();
    Ok(Json(ListWebhooksResponse { webhooks, total }))
}

/// DELETE /api/v1/webhooks/{id} - Remove a subscription
#[utoipa::path(
    delete,
    path = "/api/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription id")),
    responses(
        (status = 204, description = "Subscription removed"),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "No such subscription", body = ApiError),
    )
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let user = authenticate_user(&state.tokens, &headers)?;
    state.webhooks.delete_subscription(id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
