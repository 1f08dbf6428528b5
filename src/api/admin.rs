//! Admin API endpoints
//!
//! Triggers for the timeline maintenance operations.
//! Routes require the configured bearer token when one is set.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use crate::service::{FanoutOutcome, PruneOutcome, RebuildOutcome};

/// Create admin router
///
/// Routes:
/// - POST /admin/timelines/posts/:id - Fan out one post
/// - POST /admin/timelines/prune - Trim timelines and lists
/// - POST /admin/timelines/rebuild - Recompute all membership
pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/timelines/posts/:id", post(append_post))
        .route("/timelines/prune", post(prune))
        .route("/timelines/rebuild", post(rebuild))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Middleware rejecting requests without the configured admin token
///
/// An unset or blank `server.admin_token` leaves the routes open.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .server
        .admin_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(expected) = expected {
        match extract_bearer_token(request.headers()) {
            Some(token) if token == expected => {}
            _ => {
                tracing::warn!(path = %request.uri().path(), "Rejected admin request");
                return Err(AppError::Unauthorized);
            }
        }
    }

    Ok(next.run(request).await)
}

fn record_request(endpoint: &str, result: &Result<impl Sized, AppError>) {
    let status = match result {
        Ok(_) => "200",
        Err(AppError::NotFound) => "404",
        Err(AppError::Validation(_)) => "400",
        Err(_) => "500",
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", endpoint, status])
        .inc();
}

// =============================================================================
// Timelines
// =============================================================================

/// POST /admin/timelines/posts/:id
///
/// Fans out an already persisted post.
async fn append_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<FanoutOutcome>, AppError> {
    const ENDPOINT: &str = "/admin/timelines/posts/:id";
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", ENDPOINT])
        .start_timer();

    let result = state.timelines.append_post_to_timelines(&post_id).await;
    record_request(ENDPOINT, &result);
    Ok(Json(result?))
}

/// POST /admin/timelines/prune
async fn prune(State(state): State<AppState>) -> Result<Json<PruneOutcome>, AppError> {
    const ENDPOINT: &str = "/admin/timelines/prune";
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", ENDPOINT])
        .start_timer();

    let result = state.timelines.prune_old_posts_from_timelines().await;
    record_request(ENDPOINT, &result);
    Ok(Json(result?))
}

/// Rebuild request
#[derive(Debug, Default, Deserialize)]
struct RebuildRequest {
    /// Posts scanned per batch
    window: Option<usize>,
}

/// POST /admin/timelines/rebuild
///
/// Body is optional: `{ "window": 500 }` overrides the configured batch size.
async fn rebuild(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RebuildOutcome>, AppError> {
    const ENDPOINT: &str = "/admin/timelines/rebuild";
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", ENDPOINT])
        .start_timer();

    let result = match parse_rebuild_request(&body) {
        Ok(request) => state.timelines.rebuild_timelines(request.window).await,
        Err(e) => Err(e),
    };
    record_request(ENDPOINT, &result);
    Ok(Json(result?))
}

fn parse_rebuild_request(body: &[u8]) -> Result<RebuildRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RebuildRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("invalid rebuild request: {e}")))
}
