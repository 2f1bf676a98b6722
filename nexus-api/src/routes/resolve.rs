//! Resolution routes, including the deprecation response headers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    BatchResolveRequest, BatchResolveResponse, ResolveQuery, ResolveResponse,
};
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};

/// `X-NAP-Deprecated: true` on resolutions of deprecated agents.
pub const DEPRECATED_HEADER: &str = "x-nap-deprecated";

/// `X-NAP-Replacement: <agent uri or empty>`.
pub const REPLACEMENT_HEADER: &str = "x-nap-replacement";

/// RFC 1123 rendering for the `Sunset` header.
fn httpdate(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// GET /api/v1/resolve?uri=agent://... - Resolve one URI
///
/// Deprecated agents still resolve with 200; the response carries
/// `X-NAP-Deprecated`, `Sunset` and `X-NAP-Replacement` headers so
/// callers can migrate.
#[utoipa::path(
    get,
    path = "/api/v1/resolve",
    tag = "Resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Live endpoint for the URI", body = ResolveResponse),
        (status = 404, description = "Unknown or non-resolvable URI", body = ApiError),
    )
)]
pub async fn resolve_single(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Response> {
    let resolved = state.resolver.resolve_str(&query.uri).await?;
    let agent = &resolved.agent;

    let body = ResolveResponse {
        uri: agent.uri().to_string(),
        endpoint: agent.endpoint.clone(),
        status: agent.status,
        trust_tier: agent.trust_tier(),
        display_name: agent.display_name.clone(),
        deprecation: resolved.deprecation.clone(),
    };

    let mut response = Json(body).into_response();
    if let Some(deprecation) = &resolved.deprecation {
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static(DEPRECATED_HEADER),
            HeaderValue::from_static("true"),
        );
        if let Some(sunset) = deprecation.sunset_date {
            if let Ok(value) = HeaderValue::from_str(&httpdate(sunset)) {
                headers.insert(HeaderName::from_static("sunset"), value);
            }
        }
        let replacement = deprecation.replacement_uri.as_deref().unwrap_or("");
        if let Ok(value) = HeaderValue::from_str(replacement) {
            headers.insert(HeaderName::from_static(REPLACEMENT_HEADER), value);
        }
    }
    Ok(response)
}

/// POST /api/v1/resolve/batch - Resolve up to 100 URIs
///
/// Items succeed or fail independently; the batch itself is 2xx whenever
/// the request shape is valid.
#[utoipa::path(
    post,
    path = "/api/v1/resolve/batch",
    tag = "Resolve",
    request_body = BatchResolveRequest,
    responses(
        (status = 200, description = "Per-URI results", body = BatchResolveResponse),
        (status = 400, description = "More than 100 URIs", body = ApiError),
    )
)]
pub async fn resolve_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchResolveRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.resolver.resolve_batch(req.uris).await?))
}
