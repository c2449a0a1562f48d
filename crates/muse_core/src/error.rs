//! Error types for muse_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for muse_core operations.
#[derive(Error, Debug)]
pub enum MuseError {
    /// Object with the given ID was not found in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Hash verification failed during object read.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The expected object ID
        expected: String,
        /// The actual computed hash
        actual: String,
    },

    /// The object file is corrupted or has invalid format.
    #[error("corrupted object at {}: {}", path.display(), reason)]
    CorruptedObject {
        /// Path to the corrupted object
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Invalid hex string for ObjectId parsing.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Serialization error during typed object operations.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error during typed object operations.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Blob exceeds maximum allowed size.
    #[error("blob too large: {size} bytes exceeds limit of {limit} bytes")]
    BlobTooLarge {
        /// Actual size of the blob
        size: usize,
        /// Maximum allowed size
        limit: usize,
    },

    /// Reference not found.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// Invalid ref file content or format.
    #[error("invalid ref at {}: {}", path.display(), reason)]
    InvalidRef {
        /// Path to the invalid ref file
        path: PathBuf,
        /// Description of what's invalid
        reason: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No `.muse` directory at or above the given path.
    #[error("not a muse repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// `init` was called on a directory that already holds a repository.
    #[error("muse repository already exists at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Another command holds the repository lock.
    #[error("repository busy: lock held{}", holder.map(|p| format!(" by PID {}", p)).unwrap_or_default())]
    RepositoryBusy {
        /// PID recorded in the lock file, if readable
        holder: Option<u32>,
    },

    /// Checkout or merge blocked by uncommitted working-tree changes.
    #[error("uncommitted changes would be overwritten: {}", paths.join(", "))]
    DriftDetected {
        /// Paths that differ from HEAD
        paths: Vec<String>,
    },

    /// Merge could not be resolved automatically.
    #[error("merge conflict in: {}", paths.join(", "))]
    MergeConflict {
        /// Conflicting paths
        paths: Vec<String>,
    },

    /// `merge --continue` called while conflicts remain.
    #[error("unresolved conflicts remain: {}", paths.join(", "))]
    UnresolvedConflicts {
        /// Paths still awaiting `resolve`
        paths: Vec<String>,
    },

    /// An operation that requires a clean merge state found one in progress.
    #[error("a merge is in progress")]
    MergeInProgress,

    /// `resolve`, `merge --continue`, or `merge --abort` without a merge.
    #[error("no merge in progress")]
    NoMergeInProgress,

    /// `resolve` named a path that is not in conflict.
    #[error("path is not in conflict: {0}")]
    NotInConflict(String),

    /// A revision string did not resolve to a commit.
    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    /// A branch with this name already exists.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// Branch name failed validation.
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    /// The current branch has no commits yet.
    #[error("no commits yet on {0}")]
    NoCommits(String),

    /// Working tree matches HEAD.
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,

    /// No remote is configured under this name.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Network failure or timeout talking to a remote.
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// The remote refused the request (auth, non-fast-forward, bad objects).
    #[error("remote rejected request ({status}): {message}")]
    RemoteRejected {
        /// HTTP-like status code
        status: u16,
        /// Message returned by the remote
        message: String,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),
}

impl MuseError {
    /// Stable machine-readable error kind, used in structured payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ObjectNotFound(_) => "object_not_found",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::CorruptedObject { .. } => "corrupted_object",
            Self::InvalidHex(_) => "invalid_hex",
            Self::Serialization(_) => "serialization",
            Self::Deserialization(_) => "deserialization",
            Self::Compression(_) => "compression",
            Self::BlobTooLarge { .. } => "blob_too_large",
            Self::RefNotFound(_) => "ref_not_found",
            Self::InvalidRef { .. } => "invalid_ref",
            Self::Io(_) => "io",
            Self::NotARepository(_) => "not_a_repository",
            Self::AlreadyInitialized(_) => "already_initialized",
            Self::RepositoryBusy { .. } => "repository_busy",
            Self::DriftDetected { .. } => "drift_detected",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::UnresolvedConflicts { .. } => "unresolved_conflicts",
            Self::MergeInProgress => "merge_in_progress",
            Self::NoMergeInProgress => "no_merge_in_progress",
            Self::NotInConflict(_) => "not_in_conflict",
            Self::UnknownRevision(_) => "unknown_revision",
            Self::BranchExists(_) => "branch_exists",
            Self::InvalidBranchName(_) => "invalid_branch_name",
            Self::NoCommits(_) => "no_commits",
            Self::NothingToCommit => "nothing_to_commit",
            Self::RemoteNotFound(_) => "remote_not_found",
            Self::RemoteUnreachable(_) => "remote_unreachable",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::Config(_) => "config",
        }
    }

    /// Paths carried by drift and conflict errors.
    pub fn paths(&self) -> &[String] {
        match self {
            Self::DriftDetected { paths }
            | Self::MergeConflict { paths }
            | Self::UnresolvedConflicts { paths } => paths,
            _ => &[],
        }
    }

    /// Returns true for object-graph corruption, which is never repaired.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::HashMismatch { .. } | Self::CorruptedObject { .. } | Self::ObjectNotFound(_)
        )
    }

    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::CorruptedObject { .. } | Self::HashMismatch { .. } => {
                Some("The object store is corrupted. Run 'muse verify' and restore the object from a remote.")
            }
            Self::ObjectNotFound(_) => {
                Some("An object is missing. Run 'muse verify', then pull from a remote that has it.")
            }
            Self::RepositoryBusy { .. } => {
                Some("Another muse command is running. Retry once it finishes.")
            }
            Self::DriftDetected { .. } => {
                Some("Commit your changes, or pass --force to discard them.")
            }
            Self::MergeConflict { .. } => Some(
                "Resolve each path with 'muse resolve <path> --ours|--theirs', then 'muse merge --continue'.",
            ),
            Self::UnresolvedConflicts { .. } => {
                Some("Run 'muse resolve <path> --ours|--theirs' for every remaining path.")
            }
            Self::MergeInProgress => {
                Some("Finish the merge with 'muse merge --continue' or discard it with 'muse merge --abort'.")
            }
            Self::NotARepository(_) => Some("Run 'muse init' to create a repository."),
            Self::RemoteNotFound(_) => Some("Add it with 'muse remote add <name> <url>'."),
            Self::RemoteUnreachable(_) => {
                Some("Local state is unchanged. Check the hub URL and retry.")
            }
            Self::RemoteRejected { .. } => {
                Some("Local state is unchanged. Check your token, or pull before pushing.")
            }
            _ => None,
        }
    }
}

/// Convenience Result type for muse_core operations.
pub type Result<T> = std::result::Result<T, MuseError>;
