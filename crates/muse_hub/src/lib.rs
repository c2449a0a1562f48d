//! Muse Hub: hosts bare repositories over HTTP.
//!
//! Clients push and pull through [`muse_core::HttpRemote`] at
//! `http://<bind>/repos/<repo_id>`. Each repository is a directory under
//! the Hub root holding objects, refs, and the issue and pull-request
//! records layered on top of them.
//!
//! # Example
//!
//! ```no_run
//! use muse_hub::{serve, HubConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7878").await?;
//! serve(
//!     listener,
//!     HubConfig {
//!         root: "hub-data".into(),
//!         token: None,
//!     },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod collab;
mod error;
mod handlers;
mod router;
mod state;

pub use collab::{
    CollabStore, Issue, IssueState, NewIssue, NewPullRequest, PullRequest, PullState,
};
pub use error::{ErrorBody, HubError, HubResult};
pub use handlers::{MergePullRequest, MergePullResponse, HUB_AUTHOR};
pub use router::{build_router, MAX_BODY_BYTES};
pub use state::{validate_repo_id, HubConfig, HubState, REPO_LOCK_TIMEOUT};

use tokio::net::TcpListener;

/// Serves the Hub on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, config: HubConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.root)?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        root = %config.root.display(),
        auth = config.token.is_some(),
        "hub listening"
    );

    let app = build_router(HubState::new(config));
    axum::serve(listener, app).await
}
