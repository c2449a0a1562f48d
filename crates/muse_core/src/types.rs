//! Core stored object types: trees and commits.

use crate::ObjectId;
use serde::{Deserialize, Serialize};

/// Directory snapshot.
///
/// Entries are kept sorted by name so the serialized form, and therefore the
/// tree's ObjectId, does not depend on insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    /// Sorted list of entries (MUST be sorted by name for determinism).
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Creates a new tree, automatically sorting entries by name.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Entry in a tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Name of the entry (filename or directory name).
    pub name: String,
    /// Type of entry.
    pub kind: TreeEntryKind,
    /// ObjectId pointing to the content (blob or tree).
    pub id: ObjectId,
}

/// Type of tree entry.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    /// Document (blob).
    Blob = 1,
    /// Directory (subtree).
    Tree = 2,
}

/// Immutable node in the history DAG.
///
/// The commit id covers every field, including the parent list, so history
/// is tamper-evident: rewriting any ancestor changes every descendant id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree snapshot.
    pub tree: ObjectId,
    /// Parent commit IDs: none for a root commit, two for a merge.
    pub parents: Vec<ObjectId>,
    /// Author name.
    pub author: String,
    /// Timestamp (Unix seconds).
    pub timestamp_unix: u64,
    /// Commit message.
    pub message: String,
}

impl Commit {
    /// Returns true if this commit joins two lines of history.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}
