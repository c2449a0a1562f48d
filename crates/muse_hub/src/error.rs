//! Hub errors and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use muse_core::MuseError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by Hub handlers.
#[derive(Error, Debug)]
pub enum HubError {
    /// Failure inside the version-control engine.
    #[error(transparent)]
    Core(#[from] MuseError),

    /// Missing bearer token or wrong token.
    #[error("missing or invalid bearer token")]
    Unauthorized,

    /// Unknown repository, issue, or pull request.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Request conflicts with the current state (e.g. PR already merged).
    #[error("{0}")]
    Conflict(String),

    /// A blocking task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

pub type HubResult<T> = std::result::Result<T, HubError>;

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::Core(err) => core_status(err),
            HubError::Unauthorized => StatusCode::UNAUTHORIZED,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HubError::Conflict(_) => StatusCode::CONFLICT,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HubError::Core(MuseError::RemoteRejected { status, .. }) => match status {
                400 => "bad_request",
                404 => "not_found",
                409 => "conflict",
                _ => "rejected",
            },
            HubError::Core(err) => err.code(),
            HubError::Unauthorized => "unauthorized",
            HubError::NotFound(_) => "not_found",
            HubError::BadRequest(_) => "bad_request",
            HubError::Conflict(_) => "conflict",
            HubError::Internal(_) => "internal",
        }
    }
}

fn core_status(err: &MuseError) -> StatusCode {
    match err {
        MuseError::RemoteRejected { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        MuseError::MergeConflict { .. } => StatusCode::CONFLICT,
        MuseError::RefNotFound(_)
        | MuseError::UnknownRevision(_)
        | MuseError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
        MuseError::InvalidBranchName(_)
        | MuseError::InvalidHex(_)
        | MuseError::HashMismatch { .. }
        | MuseError::Deserialization(_) => StatusCode::BAD_REQUEST,
        MuseError::RepositoryBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }

        let paths = match &self {
            HubError::Core(err) => err.paths().to_vec(),
            _ => Vec::new(),
        };
        // The client wraps this message in its own RemoteRejected
        let message = match &self {
            HubError::Core(MuseError::RemoteRejected { message, .. }) => message.clone(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
            paths,
        };
        (status, Json(body)).into_response()
    }
}
