//! Axum router.
//!
//! ```text
//! /health                                 - liveness, no auth
//! /repos/{repo_id}/push                   - object + ref upload
//! /repos/{repo_id}/refs[/{branch}]        - branch tips
//! /repos/{repo_id}/objects/missing        - which ids the Hub lacks
//! /repos/{repo_id}/fetch                  - objects for a pull
//! /repos/{repo_id}/issues                 - list / open issues
//! /repos/{repo_id}/pulls                  - list / open pull requests
//! /repos/{repo_id}/pulls/{number}/merge   - merge a pull request
//! ```

use crate::auth::require_token;
use crate::handlers::*;
use crate::state::HubState;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

/// Largest accepted request body. Pushes carry hex-encoded objects.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

pub fn build_router(state: HubState) -> Router {
    let repos = Router::new()
        .route("/repos/{repo_id}/push", post(push))
        .route("/repos/{repo_id}/refs", get(list_refs))
        .route("/repos/{repo_id}/refs/{*branch}", get(get_ref))
        .route("/repos/{repo_id}/objects/missing", post(missing))
        .route("/repos/{repo_id}/fetch", post(fetch))
        .route(
            "/repos/{repo_id}/issues",
            get(list_issues).post(create_issue),
        )
        .route("/repos/{repo_id}/pulls", get(list_pulls).post(create_pull))
        .route("/repos/{repo_id}/pulls/{number}/merge", post(merge_pull))
        .route_layer(from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(repos)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
