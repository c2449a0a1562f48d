//! Muse Core Library
//!
//! Version control for musical composition data:
//! - Content-addressed storage of documents, trees, and commits
//! - Note-level diffs of track documents
//! - Three-way merges that detect conflicts per phrase, not per line
//! - Checkout with drift detection
//! - Push/pull against a Hub or a bare repository directory
//!
//! # Quick Start
//!
//! ```
//! use muse_core::{MergeOutcome, MuseRepo};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let repo = MuseRepo::init(tmp.path()).unwrap();
//!
//! std::fs::write(tmp.path().join("project.json"), r#"{"tempo": 120}"#).unwrap();
//! repo.commit("A").unwrap();
//!
//! repo.checkout_new_branch("experiment").unwrap();
//! std::fs::write(tmp.path().join("bass.json"), r#"{"name": "bass", "regions": []}"#).unwrap();
//! repo.commit("B").unwrap();
//!
//! repo.checkout("main", false).unwrap();
//! std::fs::write(tmp.path().join("project.json"), r#"{"tempo": 110}"#).unwrap();
//! repo.commit("C").unwrap();
//!
//! let outcome = repo.merge("experiment").unwrap();
//! assert!(matches!(outcome, MergeOutcome::Merged(_)));
//! assert!(tmp.path().join("bass.json").exists());
//! ```
//!
//! # Content-Addressed Storage
//!
//! Objects are stored using BLAKE3 content hashing with zstd compression:
//!
//! ```
//! use muse_core::ObjectStore;
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = ObjectStore::new(tmp.path().join("objects"));
//!
//! // Same content = same ID (deduplication)
//! let id1 = store.put(b"content").unwrap();
//! let id2 = store.put(b"content").unwrap();
//! assert_eq!(id1, id2);
//! assert_eq!(store.get(id1).unwrap(), b"content");
//! ```

mod bare;
mod config;
mod diff;
mod document;
mod error;
mod graph;
mod lock;
mod merge;
mod object_id;
mod object_store;
mod refs;
mod remote;
mod repo;
mod snapshot;
mod types;
mod verify;
mod worktree;

pub use bare::{BareMerge, BareRepo};
pub use config::{
    Config, CoreConfig, RemoteConfig, RepoInfo, StorageConfig, UserConfig, AUTHOR_ENV,
    FORMAT_VERSION, TOKEN_ENV,
};
pub use diff::{
    attach_document_diffs, diff_documents, diff_maps, diff_trees, ChangeKind, DocumentDiff,
    NoteChange, PathChange, Phrase, PhraseChanges, RegionChange,
};
pub use document::{
    canonicalize, Document, Note, NoteKey, Region, TrackDocument, DEFAULT_TICKS_PER_BAR,
};
pub use error::{MuseError, Result};
pub use graph::{
    is_ancestor, log, merge_base, reachable_commits, render_ascii, render_dot, render_json,
    CommitGraph, LogEntry,
};
pub use lock::RepoLock;
pub use merge::{
    merge_trees, merge_tracks, plan_merge, ConflictKind, MergePlan, MergeState, MergedPath,
    PathConflict, PhraseConflict, Resolution, TreeMerge, MERGE_STATE_FILE,
};
pub use object_id::{ObjectId, ObjectKind};
pub use object_store::{ObjectStore, DEFAULT_COMPRESSION_LEVEL};
pub use refs::{validate_branch_name, Head, Refs, DEFAULT_BRANCH};
pub use remote::{
    object_closure, open_remote, pack_objects, tree_objects, FetchRequest, FetchResponse,
    HttpRemote, LocalRemote, MissingRequest, MissingResponse, PushRequest, PushResponse,
    RefResponse, Remote, VerifiedObjects, WireObject, DEFAULT_REMOTE_TIMEOUT,
};
pub use repo::{MergeOutcome, MuseRepo, PullReport, PushReport, Status, MUSE_DIR};
pub use snapshot::{build_tree, flatten_tree, PathMap};
pub use types::*;
pub use verify::{verify, VerifyConfig, VerifyReport};
pub use worktree::WorkingTree;

/// Time provider trait for testing.
///
/// Lets tests pin commit timestamps. Only used when explicitly set via
/// `MuseRepo::with_time_provider()`.
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in seconds.
    fn now(&self) -> i64;
}

impl<F> TimeProvider for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now(&self) -> i64 {
        self()
    }
}
