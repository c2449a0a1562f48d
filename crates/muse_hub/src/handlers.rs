//! Route handlers.
//!
//! Engine calls are blocking file I/O, so every handler moves its work onto
//! the blocking pool. Writes hold the repository's mutex and its on-disk
//! lock for the whole operation.

use crate::collab::{Issue, NewIssue, NewPullRequest, PullRequest, PullState};
use crate::error::{HubError, HubResult};
use crate::state::{HubState, REPO_LOCK_TIMEOUT};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use muse_core::{
    validate_branch_name, BareMerge, FetchRequest, FetchResponse, MissingRequest,
    MissingResponse, ObjectId, PushRequest, PushResponse, RefResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// Author recorded on merge commits the Hub creates.
pub const HUB_AUTHOR: &str = "muse-hub";

async fn blocking<T, F>(work: F) -> HubResult<T>
where
    F: FnOnce() -> HubResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HubError::Internal(e.to_string()))?
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn push(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
    Json(request): Json<PushRequest>,
) -> HubResult<Json<PushResponse>> {
    let lock = state.repo_lock(&repo_id)?;
    let _guard = lock.lock().await;

    let response = blocking(move || {
        let repo = state.open_or_init_repo(&repo_id)?;
        let _lock = repo.lock(REPO_LOCK_TIMEOUT)?;
        let response = repo.receive_push(&request)?;
        info!(
            repo = %repo_id,
            branch = %response.branch,
            head = %response.head.short(),
            accepted = response.accepted,
            "push accepted"
        );
        Ok(response)
    })
    .await?;
    Ok(Json(response))
}

pub async fn get_ref(
    State(state): State<HubState>,
    Path((repo_id, branch)): Path<(String, String)>,
) -> HubResult<Json<RefResponse>> {
    validate_branch_name(&branch)?;
    blocking(move || {
        let head = match state.open_repo(&repo_id)? {
            Some(repo) => repo.head(&branch)?,
            None => None,
        };
        Ok(Json(RefResponse { branch, head }))
    })
    .await
}

pub async fn list_refs(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
) -> HubResult<Json<Vec<RefResponse>>> {
    blocking(move || {
        let refs = match state.open_repo(&repo_id)? {
            Some(repo) => repo
                .branches()?
                .into_iter()
                .map(|(branch, head)| RefResponse {
                    branch,
                    head: Some(head),
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(Json(refs))
    })
    .await
}

pub async fn missing(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
    Json(request): Json<MissingRequest>,
) -> HubResult<Json<MissingResponse>> {
    blocking(move || {
        let missing = match state.open_repo(&repo_id)? {
            Some(repo) => repo.missing(&request.ids),
            None => request.ids,
        };
        Ok(Json(MissingResponse { missing }))
    })
    .await
}

pub async fn fetch(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
    Json(request): Json<FetchRequest>,
) -> HubResult<Json<FetchResponse>> {
    blocking(move || {
        let repo = state
            .open_repo(&repo_id)?
            .ok_or_else(|| HubError::NotFound(format!("no repository '{}'", repo_id)))?;
        let response = repo.serve_fetch(&request)?;
        info!(repo = %repo_id, objects = response.objects.len(), "served fetch");
        Ok(Json(response))
    })
    .await
}

pub async fn list_issues(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
) -> HubResult<Json<Vec<Issue>>> {
    blocking(move || Ok(Json(state.collab(&repo_id)?.issues()?))).await
}

pub async fn create_issue(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
    Json(new): Json<NewIssue>,
) -> HubResult<(StatusCode, Json<Issue>)> {
    if new.title.trim().is_empty() {
        return Err(HubError::BadRequest("issue title is empty".to_string()));
    }
    let lock = state.repo_lock(&repo_id)?;
    let _guard = lock.lock().await;

    blocking(move || {
        require_repo(&state, &repo_id)?;
        let issue = state.collab(&repo_id)?.create_issue(new, now_rfc3339())?;
        info!(repo = %repo_id, number = issue.number, "issue opened");
        Ok((StatusCode::CREATED, Json(issue)))
    })
    .await
}

pub async fn list_pulls(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
) -> HubResult<Json<Vec<PullRequest>>> {
    blocking(move || Ok(Json(state.collab(&repo_id)?.pulls()?))).await
}

pub async fn create_pull(
    State(state): State<HubState>,
    Path(repo_id): Path<String>,
    Json(new): Json<NewPullRequest>,
) -> HubResult<(StatusCode, Json<PullRequest>)> {
    if new.title.trim().is_empty() {
        return Err(HubError::BadRequest("pull request title is empty".to_string()));
    }
    validate_branch_name(&new.head)?;
    validate_branch_name(&new.base)?;
    if new.head == new.base {
        return Err(HubError::BadRequest("head and base are the same branch".to_string()));
    }
    let lock = state.repo_lock(&repo_id)?;
    let _guard = lock.lock().await;

    blocking(move || {
        let repo = require_repo(&state, &repo_id)?;
        for branch in [&new.head, &new.base] {
            if repo.head(branch)?.is_none() {
                return Err(HubError::NotFound(format!("no branch '{}'", branch)));
            }
        }
        let pull = state.collab(&repo_id)?.create_pull(new, now_rfc3339())?;
        info!(
            repo = %repo_id,
            number = pull.number,
            head = %pull.head,
            base = %pull.base,
            "pull request opened"
        );
        Ok((StatusCode::CREATED, Json(pull)))
    })
    .await
}

#[derive(Deserialize, Debug, Default)]
pub struct MergePullRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MergePullResponse {
    pub number: u64,
    /// `up_to_date`, `fast_forward`, or `merged`.
    pub outcome: String,
    /// Tip of the base branch afterwards.
    pub commit: ObjectId,
}

/// Merges a pull request's head into its base with the merge engine.
/// Conflicts leave everything untouched and answer 409 with the paths.
pub async fn merge_pull(
    State(state): State<HubState>,
    Path((repo_id, number)): Path<(String, u64)>,
    Json(request): Json<MergePullRequest>,
) -> HubResult<Json<MergePullResponse>> {
    let lock = state.repo_lock(&repo_id)?;
    let _guard = lock.lock().await;

    blocking(move || {
        let repo = require_repo(&state, &repo_id)?;
        let collab = state.collab(&repo_id)?;
        let mut pull = collab
            .pull(number)?
            .ok_or_else(|| HubError::NotFound(format!("no pull request #{}", number)))?;
        if pull.state != PullState::Open {
            return Err(HubError::Conflict(format!(
                "pull request #{} is not open",
                number
            )));
        }

        let _lock = repo.lock(REPO_LOCK_TIMEOUT)?;
        let message = request
            .message
            .unwrap_or_else(|| format!("Merge pull request #{} from {}", number, pull.head));
        let author = request.author.unwrap_or_else(|| HUB_AUTHOR.to_string());
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);

        let result = repo.merge_branches(&pull.base, &pull.head, &author, timestamp, &message)?;
        let outcome = match result {
            BareMerge::UpToDate(_) => "up_to_date",
            BareMerge::FastForward(_) => "fast_forward",
            BareMerge::Merged(_) => "merged",
        };

        pull.state = PullState::Merged;
        pull.merge_commit = Some(result.commit());
        collab.update_pull(&pull)?;

        info!(
            repo = %repo_id,
            number,
            outcome,
            commit = %result.commit().short(),
            "pull request merged"
        );
        Ok(Json(MergePullResponse {
            number,
            outcome: outcome.to_string(),
            commit: result.commit(),
        }))
    })
    .await
}

fn require_repo(state: &HubState, repo_id: &str) -> HubResult<muse_core::BareRepo> {
    state
        .open_repo(repo_id)?
        .ok_or_else(|| HubError::NotFound(format!("no repository '{}'", repo_id)))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
