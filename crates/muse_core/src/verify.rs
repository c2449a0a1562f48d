//! Repository verification.
//!
//! Walks everything reachable from the refs and checks that each commit,
//! tree and blob exists and hash-verifies. Nothing is repaired.

use crate::error::{MuseError, Result};
use crate::object_id::ObjectKind;
use crate::refs::{Head, Refs};
use crate::types::{Commit, Tree, TreeEntryKind};
use crate::{ObjectId, ObjectStore};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What to check.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Also read every object in the store, reachable or not (slow).
    pub check_objects: bool,

    /// Verify refs point at commits that exist.
    pub check_refs: bool,

    /// Walk the history and its trees.
    pub check_commits: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            check_objects: false,
            check_refs: true,
            check_commits: true,
        }
    }
}

/// Findings of a verification pass.
#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    /// Objects read and hash-checked.
    pub objects_checked: usize,

    /// Objects whose content fails verification.
    pub objects_corrupted: Vec<ObjectId>,

    /// Objects referenced from history but absent from the store.
    pub objects_missing: Vec<ObjectId>,

    /// Refs examined.
    pub refs_checked: usize,

    /// Refs whose target commit is missing or unreadable.
    pub refs_dangling: Vec<String>,

    /// Commits walked.
    pub commits_checked: usize,
}

impl VerifyReport {
    /// Returns true if any issues were found.
    pub fn has_issues(&self) -> bool {
        !self.objects_corrupted.is_empty()
            || !self.objects_missing.is_empty()
            || !self.refs_dangling.is_empty()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if !self.has_issues() {
            return format!(
                "Repository is healthy: {} refs, {} commits, {} objects checked.",
                self.refs_checked, self.commits_checked, self.objects_checked
            );
        }

        let mut issues = Vec::new();
        if !self.objects_corrupted.is_empty() {
            issues.push(format!("{} corrupted objects", self.objects_corrupted.len()));
        }
        if !self.objects_missing.is_empty() {
            issues.push(format!("{} missing objects", self.objects_missing.len()));
        }
        if !self.refs_dangling.is_empty() {
            issues.push(format!("{} dangling refs", self.refs_dangling.len()));
        }
        format!("Repository has issues: {}", issues.join(", "))
    }

    fn record(&mut self, id: ObjectId, err: &MuseError) {
        match err {
            MuseError::ObjectNotFound(_) => self.objects_missing.push(id),
            _ => self.objects_corrupted.push(id),
        }
    }
}

/// Verifies repository integrity.
///
/// # Examples
///
/// ```no_run
/// use muse_core::{verify, MuseRepo, VerifyConfig};
///
/// let repo = MuseRepo::open(".").unwrap();
/// let report = verify(repo.refs(), repo.store(), VerifyConfig::default()).unwrap();
///
/// if report.has_issues() {
///     eprintln!("{}", report.summary());
/// }
/// ```
pub fn verify(refs: &Refs, store: &ObjectStore, config: VerifyConfig) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    let tips = ref_tips(refs)?;

    if config.check_refs {
        for (name, id) in &tips {
            report.refs_checked += 1;
            if !store.has(*id) {
                warn!(%name, id = %id.short(), "dangling ref");
                report.refs_dangling.push(name.clone());
            }
        }
    }

    if config.check_commits {
        let starts: Vec<ObjectId> = tips.iter().map(|(_, id)| *id).collect();
        check_history(store, &starts, &mut report);
    }

    if config.check_objects {
        check_all_objects(store, &mut report)?;
    }

    report.objects_corrupted.sort();
    report.objects_corrupted.dedup();
    report.objects_missing.sort();
    report.objects_missing.dedup();

    debug!(
        refs = report.refs_checked,
        commits = report.commits_checked,
        objects = report.objects_checked,
        "verified repository"
    );
    Ok(report)
}

/// HEAD (when detached), branches, and remote-tracking refs.
fn ref_tips(refs: &Refs) -> Result<Vec<(String, ObjectId)>> {
    let mut tips = Vec::new();
    if let Ok(Head::Detached(id)) = refs.read_head() {
        tips.push(("HEAD".to_string(), id));
    }
    for (name, id) in refs.list_branches()? {
        tips.push((format!("refs/heads/{}", name), id));
    }
    for (name, id) in refs.list_remotes()? {
        tips.push((format!("refs/remotes/{}", name), id));
    }
    Ok(tips)
}

fn check_history(store: &ObjectStore, starts: &[ObjectId], report: &mut VerifyReport) {
    let mut visited = HashSet::new();
    let mut commits: Vec<ObjectId> = starts.to_vec();
    let mut trees: Vec<ObjectId> = Vec::new();

    while let Some(id) = commits.pop() {
        if !visited.insert(id) {
            continue;
        }
        let commit: Commit = match read_checked(store, id, ObjectKind::Commit, report) {
            Some(payload) => match postcard::from_bytes(&payload) {
                Ok(commit) => commit,
                Err(_) => {
                    report.objects_corrupted.push(id);
                    continue;
                }
            },
            None => continue,
        };
        report.commits_checked += 1;
        trees.push(commit.tree);
        commits.extend(commit.parents);
    }

    while let Some(id) = trees.pop() {
        if !visited.insert(id) {
            continue;
        }
        let tree: Tree = match read_checked(store, id, ObjectKind::Tree, report) {
            Some(payload) => match postcard::from_bytes(&payload) {
                Ok(tree) => tree,
                Err(_) => {
                    report.objects_corrupted.push(id);
                    continue;
                }
            },
            None => continue,
        };
        for entry in tree.entries {
            match entry.kind {
                TreeEntryKind::Tree => trees.push(entry.id),
                TreeEntryKind::Blob => {
                    if visited.insert(entry.id) {
                        read_checked(store, entry.id, ObjectKind::Blob, report);
                    }
                }
            }
        }
    }
}

/// Reads and hash-verifies one object, recording any failure.
fn read_checked(
    store: &ObjectStore,
    id: ObjectId,
    expected: ObjectKind,
    report: &mut VerifyReport,
) -> Option<Vec<u8>> {
    report.objects_checked += 1;
    match store.read_raw(id) {
        Ok((kind, payload)) if kind == expected => Some(payload),
        Ok((kind, _)) => {
            warn!(id = %id.short(), ?kind, ?expected, "object has wrong kind");
            report.objects_corrupted.push(id);
            None
        }
        Err(e) => {
            warn!(id = %id.short(), error = %e, "object failed verification");
            report.record(id, &e);
            None
        }
    }
}

fn check_all_objects(store: &ObjectStore, report: &mut VerifyReport) -> Result<()> {
    for id in store.list_all_objects()? {
        report.objects_checked += 1;
        if let Err(e) = store.read_raw(id) {
            warn!(id = %id.short(), error = %e, "object failed verification");
            report.record(id, &e);
        }
    }
    Ok(())
}
