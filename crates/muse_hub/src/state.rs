//! Shared Hub state: where repositories live, the token, and one write
//! mutex per repository.

use crate::collab::CollabStore;
use crate::error::{HubError, HubResult};
use muse_core::BareRepo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// How long a write waits for the on-disk lock of a repository.
pub const REPO_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Directory holding one bare repository per `repo_id`.
    pub root: PathBuf,
    /// Bearer token required on `/repos` routes, if set.
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct HubState {
    inner: Arc<Inner>,
}

struct Inner {
    config: HubConfig,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl HubState {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.inner.config.token.as_deref()
    }

    pub fn root(&self) -> &Path {
        &self.inner.config.root
    }

    /// Directory of a repository. `repo_id` must already be validated.
    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        self.root().join(repo_id)
    }

    /// Opens an existing repository for reading.
    pub fn open_repo(&self, repo_id: &str) -> HubResult<Option<BareRepo>> {
        validate_repo_id(repo_id)?;
        let dir = self.repo_dir(repo_id);
        if !dir.join("objects").is_dir() {
            return Ok(None);
        }
        Ok(Some(BareRepo::open(dir)?))
    }

    /// Opens a repository, creating it on first push.
    pub fn open_or_init_repo(&self, repo_id: &str) -> HubResult<BareRepo> {
        validate_repo_id(repo_id)?;
        Ok(BareRepo::open_or_init(self.repo_dir(repo_id))?)
    }

    pub fn collab(&self, repo_id: &str) -> HubResult<CollabStore> {
        validate_repo_id(repo_id)?;
        Ok(CollabStore::new(self.repo_dir(repo_id).join("hub")))
    }

    /// The write mutex for `repo_id`, created on first use.
    pub fn repo_lock(&self, repo_id: &str) -> HubResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .inner
            .locks
            .lock()
            .map_err(|_| HubError::Internal("lock table poisoned".to_string()))?;
        Ok(locks.entry(repo_id.to_string()).or_default().clone())
    }
}

/// Repository ids are single path components of `[A-Za-z0-9._-]`, not
/// starting with a dot.
pub fn validate_repo_id(repo_id: &str) -> HubResult<()> {
    let valid = !repo_id.is_empty()
        && repo_id.len() <= 128
        && !repo_id.starts_with('.')
        && repo_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(HubError::BadRequest(format!("invalid repository id '{}'", repo_id)))
    }
}
