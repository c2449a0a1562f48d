//! Structural diffs between snapshots.
//!
//! Path-level changes are found by comparing blob ids. Modified track
//! documents are further decomposed into note changes grouped by phrase.

use crate::document::{Document, Note, NoteKey, Region, TrackDocument};
use crate::error::Result;
use crate::snapshot::{flatten_tree, PathMap};
use crate::{ObjectId, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A reviewable slice of a track: the unit at which merges detect
/// conflicts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Phrase {
    /// Track-level fields: name, instrument, ticks per bar, extras.
    Track,
    /// A region's own fields (position, length, extras) or its existence.
    Region {
        /// Region id.
        region: String,
    },
    /// Notes starting in one bar of a region.
    Bar {
        /// Region id.
        region: String,
        /// Zero-based bar index, region-relative.
        bar: u32,
    },
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phrase::Track => write!(f, "track metadata"),
            Phrase::Region { region } => write!(f, "region {}", region),
            Phrase::Bar { region, bar } => write!(f, "region {} bar {}", region, bar + 1),
        }
    }
}

/// Added, removed, or modified note: the atomic unit of semantic diffing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NoteChange {
    /// Note present only after.
    Added {
        /// The new note.
        note: Note,
    },
    /// Note present only before.
    Removed {
        /// The old note.
        note: Note,
    },
    /// Same pitch and onset, different duration, velocity, or extras.
    Modified {
        /// Old version.
        before: Note,
        /// New version.
        after: Note,
    },
}

impl NoteChange {
    /// Identity of the affected note.
    pub fn key(&self) -> NoteKey {
        match self {
            NoteChange::Added { note } | NoteChange::Removed { note } => note.key(),
            NoteChange::Modified { after, .. } => after.key(),
        }
    }

    /// The note as it exists after the change, if any.
    pub fn result(&self) -> Option<&Note> {
        match self {
            NoteChange::Added { note } => Some(note),
            NoteChange::Removed { .. } => None,
            NoteChange::Modified { after, .. } => Some(after),
        }
    }
}

impl fmt::Display for NoteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteChange::Added { note } => write!(
                f,
                "+ {} dur {} vel {}",
                note.key(),
                note.duration,
                note.velocity
            ),
            NoteChange::Removed { note } => write!(f, "- {}", note.key()),
            NoteChange::Modified { before, after } => write!(
                f,
                "~ {} dur {}->{} vel {}->{}",
                after.key(),
                before.duration,
                after.duration,
                before.velocity,
                after.velocity
            ),
        }
    }
}

/// Change to a region as a whole.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", content = "region", rename_all = "snake_case")]
pub enum RegionChange {
    /// Region exists only after.
    Added(String),
    /// Region exists only before.
    Removed(String),
    /// Start, length, or extras changed.
    Moved(String),
}

/// Note changes inside one phrase.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhraseChanges {
    /// The phrase.
    pub phrase: Phrase,
    /// Changes sorted by note identity.
    pub changes: Vec<NoteChange>,
}

/// Semantic diff of one track document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DocumentDiff {
    /// Track-level fields differ.
    pub track_changed: bool,
    /// Regions added, removed, or moved.
    pub region_changes: Vec<RegionChange>,
    /// Note changes by phrase.
    pub phrases: Vec<PhraseChanges>,
}

impl DocumentDiff {
    /// Total number of note changes.
    pub fn note_count(&self) -> usize {
        self.phrases.iter().map(|p| p.changes.len()).sum()
    }
}

/// Path-level change classification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Path only in the new snapshot.
    Added,
    /// Path only in the old snapshot.
    Removed,
    /// Path in both with different content.
    Modified,
}

/// One changed path between two snapshots.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathChange {
    /// `/`-separated path.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Blob before, if any.
    pub old: Option<ObjectId>,
    /// Blob after, if any.
    pub new: Option<ObjectId>,
    /// Note-level detail when both sides are track documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentDiff>,
}

/// Compares two path maps by blob id. Output is sorted by path.
pub fn diff_maps(old: &PathMap, new: &PathMap) -> Vec<PathChange> {
    let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let before = old.get(path).copied();
            let after = new.get(path).copied();
            let kind = match (before, after) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(a), Some(b)) if a != b => ChangeKind::Modified,
                _ => return None,
            };
            Some(PathChange {
                path: path.clone(),
                kind,
                old: before,
                new: after,
                document: None,
            })
        })
        .collect()
}

/// Fills in note-level detail for modified paths.
///
/// `load` returns the bytes of a blob; it is given the path so callers can
/// read working-tree files that are not in the store yet.
pub fn attach_document_diffs<F>(changes: &mut [PathChange], mut load: F) -> Result<()>
where
    F: FnMut(&str, ObjectId) -> Result<Vec<u8>>,
{
    for change in changes.iter_mut() {
        let (Some(old), Some(new)) = (change.old, change.new) else {
            continue;
        };
        let before = Document::parse(&change.path, &load(&change.path, old)?);
        let after = Document::parse(&change.path, &load(&change.path, new)?);
        if let (Document::Track(a), Document::Track(b)) = (&before, &after) {
            change.document = Some(diff_documents(a, b));
        }
    }
    Ok(())
}

/// Structural diff between two trees (`None` is the empty tree).
pub fn diff_trees(
    store: &ObjectStore,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
) -> Result<Vec<PathChange>> {
    let old_map = match old {
        Some(id) => flatten_tree(store, id)?,
        None => PathMap::new(),
    };
    let new_map = match new {
        Some(id) => flatten_tree(store, id)?,
        None => PathMap::new(),
    };

    let mut changes = diff_maps(&old_map, &new_map);
    attach_document_diffs(&mut changes, |_, id| store.get_blob(id))?;
    Ok(changes)
}

/// Semantic diff of two versions of a track.
pub fn diff_documents(before: &TrackDocument, after: &TrackDocument) -> DocumentDiff {
    let mut diff = DocumentDiff {
        track_changed: !before.same_metadata(after),
        ..Default::default()
    };
    let mut phrases: BTreeMap<Phrase, Vec<NoteChange>> = BTreeMap::new();

    let ids: BTreeSet<&str> = before
        .regions
        .iter()
        .chain(after.regions.iter())
        .map(|r| r.id.as_str())
        .collect();

    for id in ids {
        let pair = (before.region(id), after.region(id));
        let (old_notes, new_notes): (&[Note], &[Note]) = match pair {
            (Some(a), Some(b)) => {
                if !a.same_header(b) {
                    diff.region_changes.push(RegionChange::Moved(id.to_string()));
                }
                (&a.notes, &b.notes)
            }
            (Some(a), None) => {
                diff.region_changes.push(RegionChange::Removed(id.to_string()));
                (&a.notes, &[])
            }
            (None, Some(b)) => {
                diff.region_changes.push(RegionChange::Added(id.to_string()));
                (&[], &b.notes)
            }
            (None, None) => continue,
        };

        for (phrase, changes) in group_by_bar(id, note_changes(old_notes, new_notes), after) {
            phrases.entry(phrase).or_default().extend(changes);
        }
    }

    diff.phrases = phrases
        .into_iter()
        .map(|(phrase, changes)| PhraseChanges { phrase, changes })
        .collect();
    diff
}

/// Note changes that turn `before` into `after`, sorted by note identity.
pub(crate) fn note_changes(before: &[Note], after: &[Note]) -> Vec<NoteChange> {
    let old: BTreeMap<NoteKey, &Note> = before.iter().map(|n| (n.key(), n)).collect();
    let new: BTreeMap<NoteKey, &Note> = after.iter().map(|n| (n.key(), n)).collect();
    let keys: BTreeSet<NoteKey> = old.keys().chain(new.keys()).copied().collect();

    keys.into_iter()
        .filter_map(|key| match (old.get(&key), new.get(&key)) {
            (None, Some(n)) => Some(NoteChange::Added { note: (*n).clone() }),
            (Some(o), None) => Some(NoteChange::Removed { note: (*o).clone() }),
            (Some(o), Some(n)) if o != n => Some(NoteChange::Modified {
                before: (*o).clone(),
                after: (*n).clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Buckets note changes into bar phrases of one region.
pub(crate) fn group_by_bar(
    region: &str,
    changes: Vec<NoteChange>,
    track: &TrackDocument,
) -> BTreeMap<Phrase, Vec<NoteChange>> {
    let mut grouped: BTreeMap<Phrase, Vec<NoteChange>> = BTreeMap::new();
    for change in changes {
        let phrase = Phrase::Bar {
            region: region.to_string(),
            bar: track.bar_of(change.key().start),
        };
        grouped.entry(phrase).or_default().push(change);
    }
    grouped
}

/// Applies note changes to a region's notes.
pub(crate) fn apply_note_changes(region: &mut Region, changes: &[NoteChange]) {
    for change in changes {
        let key = change.key();
        region.notes.retain(|n| n.key() != key);
        if let Some(note) = change.result() {
            region.notes.push(note.clone());
        }
    }
}
