//! Bare repositories: objects and refs without a working tree.
//!
//! This is what a remote looks like from the other side of a push. The Hub
//! keeps one per `repo_id`; a local-directory remote is one on disk.

use crate::error::{MuseError, Result};
use crate::graph::{is_ancestor, reachable_commits};
use crate::lock::RepoLock;
use crate::merge::{plan_merge, MergePlan};
use crate::refs::{validate_branch_name, Refs};
use crate::remote::{
    object_closure, pack_objects, tree_objects, FetchRequest, FetchResponse, PushRequest,
    PushResponse, VerifiedObjects,
};
use crate::snapshot::build_tree;
use crate::types::Commit;
use crate::{ObjectId, ObjectStore};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a branch-into-branch merge on a bare repository ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BareMerge {
    /// Nothing to do; the base already contains the head.
    UpToDate(ObjectId),
    /// The base ref moved forward to the head.
    FastForward(ObjectId),
    /// A two-parent merge commit was created.
    Merged(ObjectId),
}

impl BareMerge {
    /// The base branch's tip afterwards.
    pub fn commit(&self) -> ObjectId {
        match self {
            Self::UpToDate(id) | Self::FastForward(id) | Self::Merged(id) => *id,
        }
    }
}

/// A repository with no working tree.
#[derive(Debug, Clone)]
pub struct BareRepo {
    root: PathBuf,
    store: ObjectStore,
    refs: Refs,
}

impl BareRepo {
    /// Creates the directory layout. Existing content is left alone.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("refs").join("heads"))?;
        debug!(path = %root.display(), "initialized bare repository");
        Self::open(root)
    }

    /// Opens an existing bare repository.
    ///
    /// # Errors
    ///
    /// Returns `NotARepository` if there is no object directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join("objects").is_dir() {
            return Err(MuseError::NotARepository(root));
        }
        Ok(Self {
            store: ObjectStore::new(root.join("objects")),
            refs: Refs::new(&root),
            root,
        })
    }

    /// Opens the repository, creating it on first use.
    pub fn open_or_init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if root.join("objects").is_dir() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Repository directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Object store.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Ref store.
    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Takes the writer lock.
    pub fn lock(&self, timeout: Duration) -> Result<RepoLock> {
        RepoLock::acquire(self.root.join("LOCK"), timeout)
    }

    /// Tip of a branch.
    pub fn head(&self, branch: &str) -> Result<Option<ObjectId>> {
        self.refs.read_branch(branch)
    }

    /// All branches, sorted by name.
    pub fn branches(&self) -> Result<Vec<(String, ObjectId)>> {
        self.refs.list_branches()
    }

    /// The subset of `ids` not in the store.
    pub fn missing(&self, ids: &[ObjectId]) -> Vec<ObjectId> {
        ids.iter().copied().filter(|id| !self.store.has(*id)).collect()
    }

    /// Applies a push. The caller must hold the writer lock.
    ///
    /// Objects are hash-checked and closure-checked before anything is
    /// written; the ref only moves once every object it needs is stored.
    ///
    /// # Errors
    ///
    /// `RemoteRejected` with status 400 for bad objects or an incomplete
    /// closure, 409 for a stale `old` tip or a non-fast-forward update.
    pub fn receive_push(&self, request: &PushRequest) -> Result<PushResponse> {
        validate_branch_name(&request.branch).map_err(bad_request)?;

        let verified = VerifiedObjects::decode(&request.objects).map_err(bad_request)?;
        verified
            .check_closure(&self.store, request.new)
            .map_err(bad_request)?;

        let current = self.refs.read_branch(&request.branch)?;
        if !request.force && current != request.old {
            warn!(branch = %request.branch, "push rejected: stale tip");
            return Err(conflict(format!(
                "branch '{}' moved (expected {}, found {})",
                request.branch,
                describe(request.old),
                describe(current)
            )));
        }

        // Objects are safe to keep even if the ref update below is refused
        let accepted = verified.write_to(&self.store)?;

        if let Some(current) = current {
            if !request.force && !is_ancestor(&self.store, current, request.new)? {
                warn!(branch = %request.branch, "push rejected: non-fast-forward");
                return Err(conflict(format!(
                    "non-fast-forward update of '{}'; pull first or use --force",
                    request.branch
                )));
            }
        }

        self.refs.write_branch(&request.branch, request.new)?;
        info!(
            branch = %request.branch,
            head = %request.new.short(),
            accepted,
            "push received"
        );

        Ok(PushResponse {
            branch: request.branch.clone(),
            head: request.new,
            accepted,
        })
    }

    /// Collects the objects needed to reach `want` that a client holding
    /// `have` lacks.
    ///
    /// # Errors
    ///
    /// `RemoteRejected` with status 404 if `want` isn't here.
    pub fn serve_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if !self.store.has(request.want) {
            return Err(MuseError::RemoteRejected {
                status: 404,
                message: format!("unknown commit {}", request.want.as_hex()),
            });
        }

        let have: Vec<ObjectId> = request
            .have
            .iter()
            .copied()
            .filter(|id| self.store.has(*id))
            .collect();
        let stop: HashSet<ObjectId> = have.iter().copied().collect();

        let commits = reachable_commits(&self.store, &[request.want], &stop)?;
        let mut known = tree_objects(&self.store, &have)?;
        known.extend(stop);

        let ids = object_closure(&self.store, &commits, &known)?;
        debug!(want = %request.want.short(), objects = ids.len(), "serving fetch");

        Ok(FetchResponse {
            head: request.want,
            objects: pack_objects(&self.store, &ids)?,
        })
    }

    /// Merges branch `head` into branch `base`. The caller must hold the
    /// writer lock.
    ///
    /// # Errors
    ///
    /// `RefNotFound` if either branch is missing; `MergeConflict` if the
    /// merge can't be resolved automatically (nothing is changed).
    pub fn merge_branches(
        &self,
        base: &str,
        head: &str,
        author: &str,
        timestamp_unix: u64,
        message: &str,
    ) -> Result<BareMerge> {
        let ours = self
            .refs
            .read_branch(base)?
            .ok_or_else(|| MuseError::RefNotFound(base.to_string()))?;
        let theirs = self
            .refs
            .read_branch(head)?
            .ok_or_else(|| MuseError::RefNotFound(head.to_string()))?;

        match plan_merge(&self.store, ours, theirs)? {
            MergePlan::UpToDate => Ok(BareMerge::UpToDate(ours)),
            MergePlan::FastForward(target) => {
                self.refs.write_branch(base, target)?;
                info!(base, head, tip = %target.short(), "fast-forward merge");
                Ok(BareMerge::FastForward(target))
            }
            MergePlan::Diverged { result, .. } => {
                if !result.is_clean() {
                    return Err(MuseError::MergeConflict {
                        paths: result.conflict_paths(),
                    });
                }
                let tree = build_tree(&self.store, &result.clean_paths())?;
                let commit = self.store.put_commit(&Commit {
                    tree,
                    parents: vec![ours, theirs],
                    author: author.to_string(),
                    timestamp_unix,
                    message: message.to_string(),
                })?;
                self.refs.write_branch(base, commit)?;
                info!(base, head, commit = %commit.short(), "merged");
                Ok(BareMerge::Merged(commit))
            }
        }
    }
}

fn describe(id: Option<ObjectId>) -> String {
    id.map(|id| id.short()).unwrap_or_else(|| "nothing".to_string())
}

fn bad_request(err: MuseError) -> MuseError {
    MuseError::RemoteRejected {
        status: 400,
        message: err.to_string(),
    }
}

fn conflict(message: String) -> MuseError {
    MuseError::RemoteRejected {
        status: 409,
        message,
    }
}
