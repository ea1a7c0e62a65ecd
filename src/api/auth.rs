//! Authentication middleware for the REST API
//!
//! Optional API key authentication. The key is read from the `api` query
//! parameter (`/song/{id}?api=KEY`) or the `X-Api-Key` header. When
//! `ApiConfig::api_key` is unset every request passes.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Header alternative to the `api` query parameter
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    api: Option<String>,
}

/// Middleware that rejects requests without the configured API key
///
/// Returns 401 Unauthorized if the key is missing or does not match, otherwise
/// runs the next handler.
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use tube_dl::api::auth::require_api_key;
///
/// let api_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .route_layer(middleware::from_fn_with_state(api_key, require_api_key));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    let from_query = Query::<ApiKeyQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.api);
    let from_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Query parameter wins when both are present
    match from_query.or(from_header) {
        Some(provided_key) if constant_time_eq(provided_key.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing API key (use ?api= or the X-Api-Key header)"),
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized_response(message: &str) -> Response {
    tracing::debug!(reason = message, "Rejected request");
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
