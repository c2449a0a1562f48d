//! Bearer-token authentication for repository routes.

use crate::error::HubError;
use crate::state::HubState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Rejects requests without the configured bearer token. With no token
/// configured, everything passes.
pub async fn require_token(
    State(state): State<HubState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, HubError> {
    let Some(expected) = state.token() else {
        return Ok(next.run(request).await);
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "invalid bearer token");
            Err(HubError::Unauthorized)
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "no bearer token provided");
            Err(HubError::Unauthorized)
        }
    }
}
