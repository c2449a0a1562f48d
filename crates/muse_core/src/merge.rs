//! Three-way merge of snapshots and track documents.
//!
//! Paths merge by blob id first. A path changed on both sides gets a second
//! chance if all three versions are track documents: changes are compared
//! phrase by phrase and applied together when no phrase is touched by both
//! sides in different ways.

use crate::diff::{apply_note_changes, group_by_bar, note_changes, NoteChange, Phrase};
use crate::document::{Document, Region, TrackDocument};
use crate::error::{MuseError, Result};
use crate::graph::{is_ancestor, merge_base};
use crate::snapshot::{flatten_tree, PathMap};
use crate::{ObjectId, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// File name of the persisted merge state inside `.muse`.
pub const MERGE_STATE_FILE: &str = "MERGE_STATE.json";

/// Which side a conflicted path is resolved to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The current branch's version.
    Ours,
    /// The incoming version.
    Theirs,
}

/// How a path ended up in conflict.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed the content differently.
    BothModified,
    /// One side changed the path, the other deleted it.
    ModifyDelete,
    /// Both sides created the path with different content.
    BothAdded,
}

/// Competing changes to one phrase.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhraseConflict {
    /// Where the sides collide.
    pub phrase: Phrase,
    /// Current branch's note changes in this phrase.
    pub ours: Vec<NoteChange>,
    /// Incoming note changes in this phrase.
    pub theirs: Vec<NoteChange>,
}

/// A path that could not be merged automatically.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathConflict {
    /// `/`-separated path.
    pub path: String,
    /// Classification.
    pub kind: ConflictKind,
    /// Blob on the current branch (`None` if deleted there).
    pub ours: Option<ObjectId>,
    /// Incoming blob (`None` if deleted there).
    pub theirs: Option<ObjectId>,
    /// Colliding phrases, when both sides are track documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phrases: Vec<PhraseConflict>,
}

impl PathConflict {
    /// Blob chosen by a resolution.
    pub fn pick(&self, resolution: Resolution) -> Option<ObjectId> {
        match resolution {
            Resolution::Ours => self.ours,
            Resolution::Theirs => self.theirs,
        }
    }
}

/// Outcome of merging one path.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedPath {
    /// Unchanged from base (or changed identically on both sides).
    Kept(ObjectId),
    /// New on one or both sides.
    Added(ObjectId),
    /// Deleted on one side, untouched on the other, or deleted on both.
    Removed,
    /// Changed on one side, or on both with compatible changes.
    ModifiedClean(ObjectId),
    /// Needs a human decision.
    ModifiedConflict(PathConflict),
}

impl MergedPath {
    /// The resulting blob, if the path survives and merged cleanly.
    pub fn blob(&self) -> Option<ObjectId> {
        match self {
            MergedPath::Kept(id) | MergedPath::Added(id) | MergedPath::ModifiedClean(id) => {
                Some(*id)
            }
            MergedPath::Removed | MergedPath::ModifiedConflict(_) => None,
        }
    }
}

/// Per-path result of a three-way tree merge.
#[derive(Debug, Clone, Default)]
pub struct TreeMerge {
    /// Every path present in any of the three trees.
    pub paths: BTreeMap<String, MergedPath>,
}

impl TreeMerge {
    /// True if no path needs resolution.
    pub fn is_clean(&self) -> bool {
        self.conflicts().next().is_none()
    }

    /// Conflicted paths, sorted.
    pub fn conflicts(&self) -> impl Iterator<Item = &PathConflict> {
        self.paths.values().filter_map(|p| match p {
            MergedPath::ModifiedConflict(c) => Some(c),
            _ => None,
        })
    }

    /// Names of conflicted paths, sorted.
    pub fn conflict_paths(&self) -> Vec<String> {
        self.conflicts().map(|c| c.path.clone()).collect()
    }

    /// The merged snapshot without the conflicted paths.
    pub fn clean_paths(&self) -> PathMap {
        self.paths
            .iter()
            .filter_map(|(path, merged)| merged.blob().map(|id| (path.clone(), id)))
            .collect()
    }
}

/// Three-way merge of two trees against an optional base tree.
///
/// A `None` base is the empty tree, which is how unrelated histories merge.
pub fn merge_trees(
    store: &ObjectStore,
    base: Option<ObjectId>,
    ours: ObjectId,
    theirs: ObjectId,
) -> Result<TreeMerge> {
    let base_map = match base {
        Some(id) => flatten_tree(store, id)?,
        None => PathMap::new(),
    };
    let ours_map = flatten_tree(store, ours)?;
    let theirs_map = flatten_tree(store, theirs)?;

    let all: BTreeSet<&String> = base_map
        .keys()
        .chain(ours_map.keys())
        .chain(theirs_map.keys())
        .collect();

    let mut result = TreeMerge::default();
    for path in all {
        let b = base_map.get(path).copied();
        let o = ours_map.get(path).copied();
        let t = theirs_map.get(path).copied();
        let merged = merge_path(store, path, b, o, t)?;
        result.paths.insert(path.clone(), merged);
    }

    debug!(
        paths = result.paths.len(),
        conflicts = result.conflicts().count(),
        "merged trees"
    );
    Ok(result)
}

fn merge_path(
    store: &ObjectStore,
    path: &str,
    base: Option<ObjectId>,
    ours: Option<ObjectId>,
    theirs: Option<ObjectId>,
) -> Result<MergedPath> {
    // One side (or both identically) changed the path
    let taken = if ours == theirs || theirs == base {
        Some(ours)
    } else if ours == base {
        Some(theirs)
    } else {
        None
    };
    if let Some(taken) = taken {
        return Ok(match (base, taken) {
            (_, None) => MergedPath::Removed,
            (None, Some(id)) => MergedPath::Added(id),
            (Some(b), Some(id)) if b == id => MergedPath::Kept(id),
            (Some(_), Some(id)) => MergedPath::ModifiedClean(id),
        });
    }

    let conflict = |kind, phrases| {
        MergedPath::ModifiedConflict(PathConflict {
            path: path.to_string(),
            kind,
            ours,
            theirs,
            phrases,
        })
    };

    let (Some(b), Some(o), Some(t)) = (base, ours, theirs) else {
        let kind = if base.is_none() {
            ConflictKind::BothAdded
        } else {
            ConflictKind::ModifyDelete
        };
        return Ok(conflict(kind, vec![]));
    };

    let docs = (
        Document::parse(path, &store.get_blob(b)?),
        Document::parse(path, &store.get_blob(o)?),
        Document::parse(path, &store.get_blob(t)?),
    );
    let (Document::Track(base_doc), Document::Track(ours_doc), Document::Track(theirs_doc)) = docs
    else {
        return Ok(conflict(ConflictKind::BothModified, vec![]));
    };

    match merge_tracks(&base_doc, &ours_doc, &theirs_doc) {
        Ok(merged) => {
            let id = store.put_blob(&merged.to_canonical_bytes()?)?;
            debug!(path, id = %id.short(), "auto-merged track");
            Ok(MergedPath::ModifiedClean(id))
        }
        Err(phrases) => Ok(conflict(ConflictKind::BothModified, phrases)),
    }
}

/// Three-way merge of a track at phrase granularity.
///
/// Track metadata and each region's header merge as units. Notes are
/// grouped into bar phrases using the base's bar length; a phrase changed on
/// both sides must be changed identically. Removing a region the other side
/// edited is a conflict on that region.
pub fn merge_tracks(
    base: &TrackDocument,
    ours: &TrackDocument,
    theirs: &TrackDocument,
) -> std::result::Result<TrackDocument, Vec<PhraseConflict>> {
    let mut base = base.clone();
    let mut ours = ours.clone();
    let mut theirs = theirs.clone();
    base.normalize();
    ours.normalize();
    theirs.normalize();

    let mut conflicts = Vec::new();
    let mut merged = base.clone();
    merged.regions.clear();

    if ours.same_metadata(&base) {
        copy_metadata(&mut merged, &theirs);
    } else if theirs.same_metadata(&base) || ours.same_metadata(&theirs) {
        copy_metadata(&mut merged, &ours);
    } else {
        conflicts.push(PhraseConflict {
            phrase: Phrase::Track,
            ours: vec![],
            theirs: vec![],
        });
    }

    let ids: BTreeSet<&str> = base
        .regions
        .iter()
        .chain(&ours.regions)
        .chain(&theirs.regions)
        .map(|r| r.id.as_str())
        .collect();

    for id in ids {
        let region_phrase = || Phrase::Region { region: id.to_string() };

        match (base.region(id), ours.region(id), theirs.region(id)) {
            (Some(b), Some(o), Some(t)) => {
                if let Some(region) = merge_region(&base, b, o, t, &mut conflicts) {
                    merged.regions.push(region);
                }
            }
            (Some(b), None, Some(t)) | (Some(b), Some(t), None) => {
                // Deleted on one side; fine only if the other left it alone
                if t != b {
                    let deleted = note_changes(&b.notes, &[]);
                    let edited = note_changes(&b.notes, &t.notes);
                    let (ours_side, theirs_side) = if ours.region(id).is_none() {
                        (deleted, edited)
                    } else {
                        (edited, deleted)
                    };
                    conflicts.push(PhraseConflict {
                        phrase: region_phrase(),
                        ours: ours_side,
                        theirs: theirs_side,
                    });
                }
            }
            (Some(_), None, None) => {}
            (None, Some(r), None) | (None, None, Some(r)) => merged.regions.push(r.clone()),
            (None, Some(o), Some(t)) => {
                if o == t {
                    merged.regions.push(o.clone());
                } else {
                    conflicts.push(PhraseConflict {
                        phrase: region_phrase(),
                        ours: note_changes(&[], &o.notes),
                        theirs: note_changes(&[], &t.notes),
                    });
                }
            }
            (None, None, None) => {}
        }
    }

    if conflicts.is_empty() {
        merged.normalize();
        Ok(merged)
    } else {
        Err(conflicts)
    }
}

fn copy_metadata(target: &mut TrackDocument, source: &TrackDocument) {
    target.name = source.name.clone();
    target.instrument = source.instrument.clone();
    target.ticks_per_bar = source.ticks_per_bar;
    target.extra = source.extra.clone();
}

fn merge_region(
    base_track: &TrackDocument,
    base: &Region,
    ours: &Region,
    theirs: &Region,
    conflicts: &mut Vec<PhraseConflict>,
) -> Option<Region> {
    let mut merged = base.clone();
    let before = conflicts.len();

    let header = if ours.same_header(base) {
        Some(theirs)
    } else if theirs.same_header(base) || ours.same_header(theirs) {
        Some(ours)
    } else {
        None
    };
    match header {
        Some(source) => {
            merged.start = source.start;
            merged.length = source.length;
            merged.extra = source.extra.clone();
        }
        None => conflicts.push(PhraseConflict {
            phrase: Phrase::Region {
                region: base.id.clone(),
            },
            ours: vec![],
            theirs: vec![],
        }),
    }

    let mut ours_phrases =
        group_by_bar(&base.id, note_changes(&base.notes, &ours.notes), base_track);
    let mut theirs_phrases =
        group_by_bar(&base.id, note_changes(&base.notes, &theirs.notes), base_track);
    let phrases: BTreeSet<Phrase> = ours_phrases
        .keys()
        .chain(theirs_phrases.keys())
        .cloned()
        .collect();

    for phrase in phrases {
        match (ours_phrases.remove(&phrase), theirs_phrases.remove(&phrase)) {
            (Some(o), Some(t)) if o == t => apply_note_changes(&mut merged, &o),
            (Some(o), Some(t)) => conflicts.push(PhraseConflict {
                phrase,
                ours: o,
                theirs: t,
            }),
            (Some(changes), None) | (None, Some(changes)) => {
                apply_note_changes(&mut merged, &changes)
            }
            (None, None) => {}
        }
    }

    (conflicts.len() == before).then_some(merged)
}

/// What merging `theirs` into `ours` requires.
#[derive(Debug, Clone)]
pub enum MergePlan {
    /// `theirs` is already contained in `ours`.
    UpToDate,
    /// `ours` is behind `theirs`; just move the ref.
    FastForward(ObjectId),
    /// Histories diverged; a merge commit is needed.
    Diverged {
        /// Nearest common ancestor, `None` for unrelated histories.
        base: Option<ObjectId>,
        /// Per-path result.
        result: TreeMerge,
    },
}

/// Decides how two commits merge and, if they diverged, merges their trees.
pub fn plan_merge(store: &ObjectStore, ours: ObjectId, theirs: ObjectId) -> Result<MergePlan> {
    if is_ancestor(store, theirs, ours)? {
        return Ok(MergePlan::UpToDate);
    }
    if is_ancestor(store, ours, theirs)? {
        return Ok(MergePlan::FastForward(theirs));
    }

    let base = merge_base(store, ours, theirs)?;
    let base_tree = match base {
        Some(id) => Some(store.get_commit(id)?.tree),
        None => None,
    };
    let result = merge_trees(
        store,
        base_tree,
        store.get_commit(ours)?.tree,
        store.get_commit(theirs)?.tree,
    )?;

    Ok(MergePlan::Diverged { base, result })
}

/// On-disk record of a merge waiting for conflict resolution.
///
/// Its presence in `.muse` is what "a merge is in progress" means.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MergeState {
    /// Current tip, then the incoming tip.
    pub parents: Vec<ObjectId>,
    /// Merge base; `null` for unrelated histories.
    pub base: Option<ObjectId>,
    /// Paths still awaiting `resolve`.
    pub conflict_paths: Vec<String>,
    /// What was merged in, for the commit message.
    #[serde(default)]
    pub theirs: String,
    /// Tree of everything that merged cleanly.
    pub clean_tree: ObjectId,
    /// Resolutions recorded so far.
    #[serde(default)]
    pub resolved: BTreeMap<String, Resolution>,
    /// Full conflict detail, kept after resolution.
    #[serde(default)]
    pub conflicts: Vec<PathConflict>,
}

impl MergeState {
    /// Reads the merge state, if a merge is in progress.
    pub fn load(muse_dir: &Path) -> Result<Option<Self>> {
        let path = muse_dir.join(MERGE_STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path)?;
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| MuseError::Deserialization(format!("{}: {}", MERGE_STATE_FILE, e)))
    }

    /// Writes the merge state atomically.
    pub fn save(&self, muse_dir: &Path) -> Result<()> {
        let path = muse_dir.join(MERGE_STATE_FILE);
        let tmp_path = path.with_extension("json.tmp");
        let content =
            serde_json::to_vec_pretty(self).map_err(|e| MuseError::Serialization(e.to_string()))?;

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Deletes the merge state. Missing state is not an error.
    pub fn clear(muse_dir: &Path) -> Result<()> {
        match fs::remove_file(muse_dir.join(MERGE_STATE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Records a resolution and removes the path from `conflict_paths`.
    ///
    /// # Errors
    ///
    /// Returns `NotInConflict` if the path was never conflicted.
    pub fn resolve(&mut self, path: &str, resolution: Resolution) -> Result<()> {
        if !self.conflicts.iter().any(|c| c.path == path) {
            return Err(MuseError::NotInConflict(path.to_string()));
        }
        self.conflict_paths.retain(|p| p != path);
        self.resolved.insert(path.to_string(), resolution);
        Ok(())
    }

    /// Detail for one conflicted path.
    pub fn conflict(&self, path: &str) -> Option<&PathConflict> {
        self.conflicts.iter().find(|c| c.path == path)
    }

    /// Assembles the final snapshot from the clean tree and resolutions.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedConflicts` while any path awaits resolution.
    pub fn final_paths(&self, store: &ObjectStore) -> Result<PathMap> {
        if !self.conflict_paths.is_empty() {
            return Err(MuseError::UnresolvedConflicts {
                paths: self.conflict_paths.clone(),
            });
        }

        let mut paths = flatten_tree(store, self.clean_tree)?;
        for (path, resolution) in &self.resolved {
            let chosen = self.conflict(path).and_then(|c| c.pick(*resolution));
            match chosen {
                Some(id) => {
                    paths.insert(path.clone(), id);
                }
                None => {
                    paths.remove(path);
                }
            }
        }
        Ok(paths)
    }
}
