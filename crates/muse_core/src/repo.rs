//! Repository handle providing the main Muse API.

use crate::config::{Config, RemoteConfig, RepoInfo};
use crate::diff::{attach_document_diffs, diff_trees, PathChange};
use crate::document::canonicalize;
use crate::error::{MuseError, Result};
use crate::graph::{is_ancestor, log, reachable_commits, LogEntry};
use crate::lock::RepoLock;
use crate::merge::{plan_merge, MergePlan, MergeState, PathConflict, Resolution};
use crate::object_id::ObjectKind;
use crate::refs::{branch_ref, validate_branch_name, Head, Refs, DEFAULT_BRANCH};
use crate::remote::{
    object_closure, open_remote, pack_objects, tree_objects, FetchRequest, PushRequest, Remote,
    VerifiedObjects, DEFAULT_REMOTE_TIMEOUT,
};
use crate::snapshot::{build_tree, flatten_tree, PathMap};
use crate::types::Commit;
use crate::verify::{verify, VerifyConfig, VerifyReport};
use crate::worktree::WorkingTree;
use crate::{ObjectId, ObjectStore, TimeProvider};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Name of the repository metadata directory.
pub const MUSE_DIR: &str = ".muse";

/// Minimum length of an abbreviated commit id.
const MIN_PREFIX_LEN: usize = 4;

/// Working-tree state relative to HEAD.
#[derive(Debug, Clone)]
pub struct Status {
    /// Where HEAD points.
    pub head: Head,
    /// HEAD's commit, `None` before the first commit.
    pub commit: Option<ObjectId>,
    /// Uncommitted changes (drift), sorted by path.
    pub changes: Vec<PathChange>,
    /// The pending merge, if one is waiting for resolution.
    pub merge: Option<MergeState>,
}

impl Status {
    /// True if the working tree matches HEAD.
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

/// How a merge (or the integration step of a pull) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Nothing to merge.
    UpToDate,
    /// The ref moved forward without a merge commit.
    FastForward(ObjectId),
    /// A two-parent merge commit was created.
    Merged(ObjectId),
    /// Conflicts were recorded; nothing was committed.
    Conflicted(Vec<PathConflict>),
}

impl MergeOutcome {
    /// Conflicted paths, empty unless `Conflicted`.
    pub fn conflict_paths(&self) -> Vec<String> {
        match self {
            MergeOutcome::Conflicted(conflicts) => {
                conflicts.iter().map(|c| c.path.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Remote name.
    pub remote: String,
    /// Branch pushed.
    pub branch: String,
    /// The remote's tip afterwards.
    pub head: ObjectId,
    /// Objects uploaded.
    pub objects_sent: usize,
    /// True if the remote already had this tip.
    pub up_to_date: bool,
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq)]
pub struct PullReport {
    /// Remote name.
    pub remote: String,
    /// Branch pulled.
    pub branch: String,
    /// The remote's tip.
    pub head: ObjectId,
    /// Objects newly stored locally.
    pub objects_received: usize,
    /// What happened to the local branch.
    pub outcome: MergeOutcome,
}

/// Muse repository handle.
///
/// Provides the main API for interacting with a Muse repository: a working
/// directory plus the `.muse` directory holding objects, refs, and config.
///
/// # Examples
///
/// ```
/// use muse_core::MuseRepo;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let repo = MuseRepo::init(tmp.path()).unwrap();
///
/// std::fs::write(tmp.path().join("project.json"), r#"{"tempo": 120}"#).unwrap();
/// let id = repo.commit("Initial sketch").unwrap();
///
/// assert_eq!(repo.head_commit().unwrap(), Some(id));
/// assert!(repo.status().unwrap().is_clean());
/// ```
pub struct MuseRepo {
    /// Working directory (parent of `.muse`).
    root: PathBuf,
    /// The `.muse` directory.
    muse_dir: PathBuf,
    store: ObjectStore,
    refs: Refs,
    config: Config,
    worktree: WorkingTree,
    /// Time provider for testing (None = use system time).
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl MuseRepo {
    /// Initializes a new repository with an unborn `main` branch.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if `.muse` already exists.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let muse_dir = root.join(MUSE_DIR);

        if muse_dir.exists() {
            return Err(MuseError::AlreadyInitialized(root));
        }

        fs::create_dir_all(muse_dir.join("objects"))?;
        fs::create_dir_all(muse_dir.join("refs").join("heads"))?;

        Refs::new(&muse_dir).write_head(&Head::Branch(DEFAULT_BRANCH.to_string()))?;
        Config::default().save(&muse_dir)?;
        RepoInfo::new(system_now()).save(&muse_dir)?;

        info!(path = %root.display(), "initialized repository");
        Self::open(root)
    }

    /// Opens the repository rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotARepository` if `path/.muse` doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let muse_dir = root.join(MUSE_DIR);

        if !muse_dir.is_dir() {
            return Err(MuseError::NotARepository(root));
        }

        let config = Config::load(&muse_dir)?;
        let store = ObjectStore::new(muse_dir.join("objects"))
            .with_compression_level(config.storage.compression_level);

        Ok(Self {
            refs: Refs::new(&muse_dir),
            worktree: WorkingTree::new(&root),
            store,
            config,
            root,
            muse_dir,
            time_provider: None,
        })
    }

    /// Opens the repository containing `start`, searching upwards.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref();
        for dir in start.ancestors() {
            if dir.join(MUSE_DIR).is_dir() {
                return Self::open(dir);
            }
        }
        Err(MuseError::NotARepository(start.to_path_buf()))
    }

    /// Sets a custom time provider for commit timestamps.
    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    /// Working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.muse` directory.
    pub fn muse_dir(&self) -> &Path {
        &self.muse_dir
    }

    /// Object store.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Ref store.
    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Working tree.
    pub fn worktree(&self) -> &WorkingTree {
        &self.worktree
    }

    /// Repository identity from `repo.json`.
    pub fn info(&self) -> Result<RepoInfo> {
        RepoInfo::load(&self.muse_dir)
    }

    /// Takes the writer lock, waiting up to `core.lock_timeout_ms`.
    pub fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(self.muse_dir.join("LOCK"), self.config.core.lock_timeout())
    }

    /// Where HEAD points.
    pub fn head(&self) -> Result<Head> {
        self.refs.read_head()
    }

    /// HEAD's commit, `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        self.refs.head_commit()
    }

    /// Attached branch, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.head()?.branch().map(str::to_string))
    }

    /// Local branches with their tips.
    pub fn branches(&self) -> Result<Vec<(String, ObjectId)>> {
        self.refs.list_branches()
    }

    /// The pending merge, if any.
    pub fn merge_state(&self) -> Result<Option<MergeState>> {
        MergeState::load(&self.muse_dir)
    }

    /// Working-tree drift against HEAD, with note-level detail.
    pub fn status(&self) -> Result<Status> {
        let head = self.head()?;
        let commit = self.head_commit()?;
        let changes = self.worktree_changes(&self.head_paths()?)?;
        Ok(Status {
            head,
            commit,
            changes,
            merge: self.merge_state()?,
        })
    }

    /// Snapshots the working tree and advances HEAD.
    ///
    /// # Errors
    ///
    /// `MergeInProgress` while a merge awaits resolution; `NothingToCommit`
    /// if the snapshot equals HEAD's tree.
    pub fn commit(&self, message: &str) -> Result<ObjectId> {
        let _lock = self.lock()?;
        self.ensure_no_merge()?;

        let parent = self.head_commit()?;
        let (tree, paths) = self.worktree.snapshot(&self.store)?;
        match parent {
            Some(parent) if self.store.get_commit(parent)?.tree == tree => {
                return Err(MuseError::NothingToCommit)
            }
            None if paths.is_empty() => return Err(MuseError::NothingToCommit),
            _ => {}
        }

        let id = self.store.put_commit(&Commit {
            tree,
            parents: parent.into_iter().collect(),
            author: self.config.author(),
            timestamp_unix: self.now(),
            message: message.to_string(),
        })?;
        self.advance_head(id)?;

        info!(commit = %id.short(), files = paths.len(), "committed");
        Ok(id)
    }

    /// Creates a branch at `start` (default: HEAD) without switching to it.
    pub fn branch_create(&self, name: &str, start: Option<&str>) -> Result<ObjectId> {
        validate_branch_name(name)?;
        let _lock = self.lock()?;

        if self.refs.branch_exists(name) {
            return Err(MuseError::BranchExists(name.to_string()));
        }
        let target = match start {
            Some(rev) => self.resolve_revision(rev)?,
            None => self.require_head_commit()?,
        };

        self.refs.write_branch(name, target)?;
        info!(branch = name, at = %target.short(), "created branch");
        Ok(target)
    }

    /// Deletes a branch other than the current one.
    pub fn branch_delete(&self, name: &str) -> Result<ObjectId> {
        let _lock = self.lock()?;

        if self.current_branch()?.as_deref() == Some(name) {
            return Err(MuseError::InvalidBranchName(format!(
                "{}: cannot delete the checked-out branch",
                name
            )));
        }
        let tip = self
            .refs
            .read_branch(name)?
            .ok_or_else(|| MuseError::RefNotFound(format!("refs/heads/{}", name)))?;

        self.refs.delete_ref(&branch_ref(name))?;
        info!(branch = name, "deleted branch");
        Ok(tip)
    }

    /// Switches to a branch (attached HEAD) or any other revision (detached).
    ///
    /// Without `force`, uncommitted changes block the switch and nothing is
    /// touched. With `force`, they are overwritten.
    pub fn checkout(&self, target: &str, force: bool) -> Result<Head> {
        let _lock = self.lock()?;
        self.ensure_no_merge()?;

        let branch_tip = match validate_branch_name(target) {
            Ok(()) => self.refs.read_branch(target)?,
            Err(_) => None,
        };
        let (head, commit) = match branch_tip {
            Some(tip) => (Head::Branch(target.to_string()), tip),
            None => {
                let id = self.resolve_revision(target)?;
                (Head::Detached(id), id)
            }
        };

        if !force {
            self.ensure_clean()?;
        }

        self.materialize_commit(commit)?;
        self.refs.write_head(&head)?;

        info!(target, commit = %commit.short(), force, "checked out");
        Ok(head)
    }

    /// Creates a branch at the current commit and attaches HEAD to it.
    ///
    /// The working tree is left as it is, uncommitted changes included.
    pub fn checkout_new_branch(&self, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        let _lock = self.lock()?;
        self.ensure_no_merge()?;

        if self.refs.branch_exists(name) {
            return Err(MuseError::BranchExists(name.to_string()));
        }
        if let Some(id) = self.head_commit()? {
            self.refs.write_branch(name, id)?;
        }
        self.refs.write_head(&Head::Branch(name.to_string()))?;

        info!(branch = name, "switched to new branch");
        Ok(())
    }

    /// Merges a revision into HEAD.
    ///
    /// A clean result is committed and checked out in one call. Conflicts
    /// are saved to `MERGE_STATE.json` and returned; neither HEAD nor the
    /// working tree changes until `merge_continue`.
    pub fn merge(&self, rev: &str) -> Result<MergeOutcome> {
        let _lock = self.lock()?;
        self.ensure_no_merge()?;

        let ours = self.require_head_commit()?;
        let theirs = self.resolve_revision(rev)?;
        self.ensure_clean()?;

        let branch = self.current_branch()?;
        self.integrate(branch.as_deref(), Some(ours), theirs, rev, true)
    }

    /// Picks a side for one conflicted path. Returns the paths still
    /// unresolved.
    pub fn resolve(&self, path: &str, resolution: Resolution) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        let mut state = self.merge_state()?.ok_or(MuseError::NoMergeInProgress)?;

        state.resolve(path, resolution)?;
        state.save(&self.muse_dir)?;

        debug!(path, ?resolution, remaining = state.conflict_paths.len(), "resolved");
        Ok(state.conflict_paths)
    }

    /// Commits a fully resolved merge and checks it out.
    ///
    /// # Errors
    ///
    /// `UnresolvedConflicts` while any path awaits `resolve`.
    pub fn merge_continue(&self, message: Option<&str>) -> Result<ObjectId> {
        let _lock = self.lock()?;
        let state = self.merge_state()?.ok_or(MuseError::NoMergeInProgress)?;
        self.ensure_clean()?;

        let paths = state.final_paths(&self.store)?;
        let tree = build_tree(&self.store, &paths)?;

        let (ours, theirs) = match state.parents.as_slice() {
            [ours, theirs] => (*ours, *theirs),
            _ => {
                return Err(MuseError::Deserialization(
                    "merge state must record two parents".to_string(),
                ))
            }
        };
        let branch = self.current_branch()?;
        let message = match message {
            Some(m) => m.to_string(),
            None => merge_message(&state.theirs, branch.as_deref()),
        };

        let id = self.write_merge_commit(tree, ours, theirs, message)?;
        self.worktree.materialize(&self.store, &paths)?;
        self.advance_head(id)?;
        MergeState::clear(&self.muse_dir)?;

        info!(commit = %id.short(), "merge concluded");
        Ok(id)
    }

    /// Abandons a pending merge. Refs and the working tree are untouched.
    pub fn merge_abort(&self) -> Result<()> {
        let _lock = self.lock()?;
        if self.merge_state()?.is_none() {
            return Err(MuseError::NoMergeInProgress);
        }
        MergeState::clear(&self.muse_dir)?;
        info!("merge aborted");
        Ok(())
    }

    /// History from `rev` (default: HEAD) in topological order.
    pub fn log(&self, rev: Option<&str>, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let tip = match rev {
            Some(rev) => self.resolve_revision(rev)?,
            None => self.require_head_commit()?,
        };
        log(&self.store, &[tip], limit)
    }

    /// Ref names pointing at each commit, for log decoration.
    pub fn labels(&self) -> Result<BTreeMap<ObjectId, Vec<String>>> {
        let head = self.head()?;
        let mut labels: BTreeMap<ObjectId, Vec<String>> = BTreeMap::new();

        if let Head::Detached(id) = &head {
            labels.entry(*id).or_default().push("HEAD".to_string());
        }
        for (name, id) in self.refs.list_branches()? {
            let label = if head.branch() == Some(name.as_str()) {
                format!("HEAD -> {}", name)
            } else {
                name
            };
            labels.entry(id).or_default().push(label);
        }
        for (name, id) in self.refs.list_remotes()? {
            labels.entry(id).or_default().push(name);
        }
        Ok(labels)
    }

    /// Structural diff.
    ///
    /// With no revisions, HEAD against the working tree; with one, that
    /// revision against the working tree; with two, between them.
    pub fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<Vec<PathChange>> {
        match (from, to) {
            (from, Some(to)) => {
                let old = match from {
                    Some(rev) => Some(self.commit_tree(self.resolve_revision(rev)?)?),
                    None => self.head_tree()?,
                };
                let new = self.commit_tree(self.resolve_revision(to)?)?;
                diff_trees(&self.store, old, Some(new))
            }
            (Some(from), None) => {
                let tree = self.commit_tree(self.resolve_revision(from)?)?;
                self.worktree_changes(&flatten_tree(&self.store, tree)?)
            }
            (None, None) => self.worktree_changes(&self.head_paths()?),
        }
    }

    /// Resolves a revision to a commit id.
    ///
    /// Tried in order: `HEAD`, a full id, a local branch, a remote-tracking
    /// branch (`origin/main`), and an unambiguous id prefix of at least four
    /// hex characters.
    pub fn resolve_revision(&self, rev: &str) -> Result<ObjectId> {
        let unknown = || MuseError::UnknownRevision(rev.to_string());

        if rev == "HEAD" {
            return self.require_head_commit();
        }
        if rev.len() == ObjectId::HEX_LEN {
            if let Ok(id) = ObjectId::from_hex(rev) {
                if self.store.has(id) {
                    return Ok(id);
                }
            }
        }
        if validate_branch_name(rev).is_ok() {
            if let Some(id) = self.refs.read_branch(rev)? {
                return Ok(id);
            }
            if let Some((remote, branch)) = rev.split_once('/') {
                if let Some(id) = self.refs.read_remote(remote, branch)? {
                    return Ok(id);
                }
            }
        }
        if rev.len() >= MIN_PREFIX_LEN && rev.chars().all(|c| c.is_ascii_hexdigit()) {
            let commits: Vec<ObjectId> = self
                .store
                .find_by_prefix(rev)?
                .into_iter()
                .filter(|id| {
                    matches!(self.store.read_raw(*id), Ok((ObjectKind::Commit, _)))
                })
                .collect();
            if let [id] = commits.as_slice() {
                return Ok(*id);
            }
        }
        Err(unknown())
    }

    /// Adds a named remote.
    pub fn remote_add(&mut self, name: &str, url: &str) -> Result<()> {
        validate_remote_name(name)?;
        let _lock = self.lock()?;

        if self.config.remotes.contains_key(name) {
            return Err(MuseError::Config(format!("remote '{}' already exists", name)));
        }
        self.config.remotes.insert(
            name.to_string(),
            RemoteConfig {
                url: url.to_string(),
                token: None,
            },
        );
        self.config.save(&self.muse_dir)?;
        info!(remote = name, url, "added remote");
        Ok(())
    }

    /// Removes a remote and its tracking refs.
    pub fn remote_remove(&mut self, name: &str) -> Result<()> {
        let _lock = self.lock()?;
        self.config.remote(name)?;

        self.config.remotes.remove(name);
        self.config.save(&self.muse_dir)?;
        self.refs.delete_remote_refs(name)?;
        info!(remote = name, "removed remote");
        Ok(())
    }

    /// Configured remotes.
    pub fn remotes(&self) -> Vec<(String, RemoteConfig)> {
        self.config
            .remotes
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }

    /// Pushes a branch (default: the current one) to a configured remote.
    pub fn push(&self, remote_name: &str, branch: Option<&str>, force: bool) -> Result<PushReport> {
        let remote = open_remote(self.config.remote(remote_name)?, DEFAULT_REMOTE_TIMEOUT)?;
        self.push_to(remote.as_ref(), remote_name, branch, force)
    }

    /// Pushes through an explicit transport.
    ///
    /// Only objects the remote lacks are sent. The local repository is only
    /// written to after the remote accepts, to record the tracking ref.
    pub fn push_to(
        &self,
        remote: &dyn Remote,
        remote_name: &str,
        branch: Option<&str>,
        force: bool,
    ) -> Result<PushReport> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self
                .current_branch()?
                .ok_or_else(|| MuseError::RefNotFound("HEAD is detached; name a branch".into()))?,
        };
        let local = self
            .refs
            .read_branch(&branch)?
            .ok_or_else(|| MuseError::NoCommits(branch.clone()))?;

        let remote_tip = remote.get_ref(&branch)?;
        let mut report = PushReport {
            remote: remote_name.to_string(),
            branch: branch.clone(),
            head: local,
            objects_sent: 0,
            up_to_date: remote_tip == Some(local),
        };
        if report.up_to_date {
            self.record_tracking(remote_name, &branch, local)?;
            return Ok(report);
        }

        let mut stop = HashSet::new();
        if let Some(tip) = remote_tip {
            let known_locally = self.store.has(tip);
            if !force && !(known_locally && is_ancestor(&self.store, tip, local)?) {
                return Err(MuseError::RemoteRejected {
                    status: 409,
                    message: format!(
                        "remote '{}' has diverged; pull first or use --force",
                        branch
                    ),
                });
            }
            if known_locally {
                stop.insert(tip);
            }
        }

        let commits = reachable_commits(&self.store, &[local], &stop)?;
        let stop_list: Vec<ObjectId> = stop.iter().copied().collect();
        let mut known = tree_objects(&self.store, &stop_list)?;
        known.extend(stop);

        let candidates = object_closure(&self.store, &commits, &known)?;
        let missing = remote.missing(&candidates)?;
        debug!(
            remote = %remote.location(),
            candidates = candidates.len(),
            missing = missing.len(),
            "negotiated push"
        );

        let response = remote.push(&PushRequest {
            branch: branch.clone(),
            old: remote_tip,
            new: local,
            objects: pack_objects(&self.store, &missing)?,
            force,
        })?;

        self.record_tracking(remote_name, &branch, response.head)?;
        report.head = response.head;
        report.objects_sent = missing.len();

        info!(remote = remote_name, branch = %branch, sent = missing.len(), "pushed");
        Ok(report)
    }

    /// Pulls a branch from a configured remote.
    pub fn pull(&self, remote_name: &str, branch: &str) -> Result<PullReport> {
        let remote = open_remote(self.config.remote(remote_name)?, DEFAULT_REMOTE_TIMEOUT)?;
        self.pull_from(remote.as_ref(), remote_name, branch)
    }

    /// Pulls through an explicit transport.
    ///
    /// Every received object is hash-checked and the closure of the remote
    /// tip verified before anything is written. If HEAD is on `branch`, the
    /// working tree must be clean; then the branch is fast-forwarded or
    /// merged like `merge`.
    pub fn pull_from(
        &self,
        remote: &dyn Remote,
        remote_name: &str,
        branch: &str,
    ) -> Result<PullReport> {
        validate_branch_name(branch)?;

        let want = remote
            .get_ref(branch)?
            .ok_or_else(|| MuseError::RemoteRejected {
                status: 404,
                message: format!("remote has no branch '{}'", branch),
            })?;

        let verified = if self.store.has(want) {
            VerifiedObjects::default()
        } else {
            let response = remote.fetch(&FetchRequest {
                want,
                have: self.local_tips()?,
            })?;
            if response.head != want {
                return Err(invalid_remote_data(MuseError::UnknownRevision(
                    response.head.as_hex(),
                )));
            }
            let verified = VerifiedObjects::decode(&response.objects).map_err(invalid_remote_data)?;
            verified
                .check_closure(&self.store, want)
                .map_err(invalid_remote_data)?;
            verified
        };

        let _lock = self.lock()?;
        let attached = self.head()?.branch() == Some(branch);
        if attached {
            self.ensure_no_merge()?;
            self.ensure_clean()?;
        }

        let objects_received = verified.write_to(&self.store)?;
        self.refs.write_remote(remote_name, branch, want)?;

        let ours = self.refs.read_branch(branch)?;
        let label = format!("{}/{}", remote_name, branch);
        let outcome = self.integrate(Some(branch), ours, want, &label, attached)?;

        info!(
            remote = remote_name,
            branch,
            received = objects_received,
            outcome = outcome_name(&outcome),
            "pulled"
        );
        Ok(PullReport {
            remote: remote_name.to_string(),
            branch: branch.to_string(),
            head: want,
            objects_received,
            outcome,
        })
    }

    /// Checks refs, history, and (optionally) every stored object.
    pub fn verify(&self, config: VerifyConfig) -> Result<VerifyReport> {
        verify(&self.refs, &self.store, config)
    }

    /// Folds `theirs` into the tip of `branch` (HEAD itself when `None`).
    ///
    /// `attached` means the working tree shows this branch: results are
    /// materialized and conflicts saved for resolution. Otherwise only refs
    /// move and a conflict is an error.
    fn integrate(
        &self,
        branch: Option<&str>,
        ours: Option<ObjectId>,
        theirs: ObjectId,
        label: &str,
        attached: bool,
    ) -> Result<MergeOutcome> {
        let Some(ours) = ours else {
            if attached {
                self.materialize_commit(theirs)?;
            }
            self.move_tip(branch, theirs)?;
            return Ok(MergeOutcome::FastForward(theirs));
        };

        match plan_merge(&self.store, ours, theirs)? {
            MergePlan::UpToDate => Ok(MergeOutcome::UpToDate),
            MergePlan::FastForward(target) => {
                if attached {
                    self.materialize_commit(target)?;
                }
                self.move_tip(branch, target)?;
                info!(label, to = %target.short(), "fast-forward");
                Ok(MergeOutcome::FastForward(target))
            }
            MergePlan::Diverged { base, result } => {
                let clean = result.clean_paths();
                if result.is_clean() {
                    let tree = build_tree(&self.store, &clean)?;
                    let id =
                        self.write_merge_commit(tree, ours, theirs, merge_message(label, branch))?;
                    if attached {
                        self.worktree.materialize(&self.store, &clean)?;
                    }
                    self.move_tip(branch, id)?;
                    info!(label, commit = %id.short(), "merged");
                    return Ok(MergeOutcome::Merged(id));
                }

                if !attached {
                    return Err(MuseError::MergeConflict {
                        paths: result.conflict_paths(),
                    });
                }

                let conflicts: Vec<PathConflict> = result.conflicts().cloned().collect();
                let state = MergeState {
                    parents: vec![ours, theirs],
                    base,
                    conflict_paths: result.conflict_paths(),
                    theirs: label.to_string(),
                    clean_tree: build_tree(&self.store, &clean)?,
                    resolved: BTreeMap::new(),
                    conflicts: conflicts.clone(),
                };
                state.save(&self.muse_dir)?;

                warn!(label, paths = ?state.conflict_paths, "merge stopped on conflicts");
                Ok(MergeOutcome::Conflicted(conflicts))
            }
        }
    }

    fn write_merge_commit(
        &self,
        tree: ObjectId,
        ours: ObjectId,
        theirs: ObjectId,
        message: String,
    ) -> Result<ObjectId> {
        self.store.put_commit(&Commit {
            tree,
            parents: vec![ours, theirs],
            author: self.config.author(),
            timestamp_unix: self.now(),
            message,
        })
    }

    fn move_tip(&self, branch: Option<&str>, id: ObjectId) -> Result<()> {
        match branch {
            Some(branch) => self.refs.write_branch(branch, id),
            None => self.refs.write_head(&Head::Detached(id)),
        }
    }

    fn advance_head(&self, id: ObjectId) -> Result<()> {
        let branch = self.current_branch()?;
        self.move_tip(branch.as_deref(), id)
    }

    fn record_tracking(&self, remote_name: &str, branch: &str, id: ObjectId) -> Result<()> {
        let _lock = self.lock()?;
        self.refs.write_remote(remote_name, branch, id)
    }

    fn local_tips(&self) -> Result<Vec<ObjectId>> {
        let mut tips: Vec<ObjectId> = self
            .refs
            .list_branches()?
            .into_iter()
            .chain(self.refs.list_remotes()?)
            .map(|(_, id)| id)
            .filter(|id| self.store.has(*id))
            .collect();
        tips.sort();
        tips.dedup();
        Ok(tips)
    }

    fn materialize_commit(&self, id: ObjectId) -> Result<()> {
        let paths = flatten_tree(&self.store, self.commit_tree(id)?)?;
        self.worktree.materialize(&self.store, &paths)
    }

    fn commit_tree(&self, id: ObjectId) -> Result<ObjectId> {
        Ok(self.store.get_commit(id)?.tree)
    }

    fn head_tree(&self) -> Result<Option<ObjectId>> {
        match self.head_commit()? {
            Some(id) => Ok(Some(self.commit_tree(id)?)),
            None => Ok(None),
        }
    }

    fn head_paths(&self) -> Result<PathMap> {
        match self.head_tree()? {
            Some(tree) => flatten_tree(&self.store, tree),
            None => Ok(PathMap::new()),
        }
    }

    fn require_head_commit(&self) -> Result<ObjectId> {
        match self.head()? {
            Head::Detached(id) => Ok(id),
            Head::Branch(name) => self
                .refs
                .read_branch(&name)?
                .ok_or(MuseError::NoCommits(name)),
        }
    }

    fn worktree_changes(&self, base: &PathMap) -> Result<Vec<PathChange>> {
        let mut changes = self.worktree.status(base)?;
        attach_document_diffs(&mut changes, |path, id| {
            if self.store.has(id) {
                self.store.get_blob(id)
            } else {
                canonicalize(path, &self.worktree.read(path)?)
            }
        })?;
        Ok(changes)
    }

    fn ensure_clean(&self) -> Result<()> {
        let drift = self.worktree.status(&self.head_paths()?)?;
        if drift.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = drift.into_iter().map(|c| c.path).collect();
        warn!(?paths, "working tree has uncommitted changes");
        Err(MuseError::DriftDetected { paths })
    }

    fn ensure_no_merge(&self) -> Result<()> {
        if self.muse_dir.join(crate::merge::MERGE_STATE_FILE).exists() {
            return Err(MuseError::MergeInProgress);
        }
        Ok(())
    }

    fn now(&self) -> u64 {
        match &self.time_provider {
            Some(provider) => provider.now().max(0) as u64,
            None => system_now(),
        }
    }
}

fn system_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn merge_message(label: &str, branch: Option<&str>) -> String {
    match branch {
        Some(branch) => format!("Merge {} into {}", label, branch),
        None => format!("Merge {}", label),
    }
}

fn outcome_name(outcome: &MergeOutcome) -> &'static str {
    match outcome {
        MergeOutcome::UpToDate => "up-to-date",
        MergeOutcome::FastForward(_) => "fast-forward",
        MergeOutcome::Merged(_) => "merged",
        MergeOutcome::Conflicted(_) => "conflicted",
    }
}

fn validate_remote_name(name: &str) -> Result<()> {
    validate_branch_name(name)?;
    if name.contains('/') {
        return Err(MuseError::Config(format!(
            "invalid remote name '{}': may not contain '/'",
            name
        )));
    }
    Ok(())
}

/// Anything wrong with fetched data is the remote's fault; local state is
/// untouched at this point.
fn invalid_remote_data(err: MuseError) -> MuseError {
    MuseError::RemoteRejected {
        status: 502,
        message: format!("remote sent invalid data: {}", err),
    }
}
