//! Musical documents: tracks, regions, and notes.
//!
//! Every file in a working tree is stored as a blob of canonical bytes.
//! `.json` files that look like tracks get a semantic model so diffs and
//! merges can work on notes instead of lines.

use crate::error::{MuseError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Default resolution: 480 ticks per quarter note, 4/4 time.
pub const DEFAULT_TICKS_PER_BAR: u32 = 1920;

fn default_ticks_per_bar() -> u32 {
    DEFAULT_TICKS_PER_BAR
}

/// One track: metadata plus a set of regions.
///
/// Fields this model doesn't know are kept in `extra` and survive
/// canonicalization, diff, and merge untouched.
///
/// # Examples
///
/// ```
/// use muse_core::TrackDocument;
///
/// let json = br#"{"name": "keys", "regions": [
///     {"id": "verse", "start": 0, "length": 7680,
///      "notes": [{"pitch": 60, "start": 0, "duration": 480, "velocity": 90}]}
/// ]}"#;
/// let track = TrackDocument::from_json(json).unwrap();
/// assert_eq!(track.ticks_per_bar, 1920);
/// assert_eq!(track.regions[0].notes[0].pitch, 60);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackDocument {
    /// Track name.
    pub name: String,
    /// Instrument or patch name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Bar length in ticks; used to slice regions into phrases.
    #[serde(default = "default_ticks_per_bar")]
    pub ticks_per_bar: u32,
    /// Regions, identified by `id`.
    pub regions: Vec<Region>,
    /// Unknown top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A time span of a track holding notes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Region {
    /// Stable identifier, unique within the track.
    pub id: String,
    /// Position on the track timeline, in ticks.
    pub start: u32,
    /// Length in ticks.
    pub length: u32,
    /// Notes, unique by `(pitch, start)`.
    pub notes: Vec<Note>,
    /// Unknown region fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Region {
    /// Looks up a note by identity.
    pub fn note(&self, key: NoteKey) -> Option<&Note> {
        self.notes.iter().find(|n| n.key() == key)
    }

    /// True if everything except the notes is equal.
    pub fn same_header(&self, other: &Region) -> bool {
        self.id == other.id
            && self.start == other.start
            && self.length == other.length
            && self.extra == other.extra
    }
}

/// A single note event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Note {
    /// MIDI pitch (0-127).
    pub pitch: u8,
    /// Onset in ticks, relative to the region start.
    pub start: u32,
    /// Length in ticks.
    pub duration: u32,
    /// MIDI velocity.
    pub velocity: u8,
    /// Unknown note fields (articulation, channel, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    /// Identity of this note within its region.
    pub fn key(&self) -> NoteKey {
        NoteKey {
            pitch: self.pitch,
            start: self.start,
        }
    }
}

/// Identity of a note: two notes at the same pitch and onset are the same
/// note, possibly with different duration or velocity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteKey {
    /// MIDI pitch.
    pub pitch: u8,
    /// Onset in ticks, region-relative.
    pub start: u32,
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pitch {} @ {}", self.pitch, self.start)
    }
}

impl TrackDocument {
    /// Parses and validates a track.
    ///
    /// # Errors
    ///
    /// Returns `Deserialization` if the bytes are not a track, or if region
    /// ids or note keys repeat.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let track: TrackDocument =
            serde_json::from_slice(bytes).map_err(|e| MuseError::Deserialization(e.to_string()))?;
        track.validate()?;
        Ok(track)
    }

    /// Checks the identity invariants the merge engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_bar == 0 {
            return Err(MuseError::Deserialization(
                "ticks_per_bar must be positive".to_string(),
            ));
        }

        let mut ids = BTreeSet::new();
        for region in &self.regions {
            if !ids.insert(region.id.as_str()) {
                return Err(MuseError::Deserialization(format!(
                    "duplicate region id: {}",
                    region.id
                )));
            }

            let mut keys = BTreeSet::new();
            for note in &region.notes {
                if !keys.insert(note.key()) {
                    return Err(MuseError::Deserialization(format!(
                        "duplicate note in region {}: {}",
                        region.id,
                        note.key()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Looks up a region by id.
    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Bar index a region-relative tick falls into.
    pub fn bar_of(&self, tick: u32) -> u32 {
        tick / self.ticks_per_bar.max(1)
    }

    /// True if track-level fields (everything but regions) are equal.
    pub fn same_metadata(&self, other: &TrackDocument) -> bool {
        self.name == other.name
            && self.instrument == other.instrument
            && self.ticks_per_bar == other.ticks_per_bar
            && self.extra == other.extra
    }

    /// Sorts regions by id and notes by `(start, pitch)`.
    pub fn normalize(&mut self) {
        self.regions.sort_by(|a, b| a.id.cmp(&b.id));
        for region in &mut self.regions {
            region.notes.sort_by_key(|n| (n.start, n.pitch));
        }
    }

    /// Canonical bytes: normalized, sorted keys, pretty-printed.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut normalized = self.clone();
        normalized.normalize();
        let value =
            serde_json::to_value(&normalized).map_err(|e| MuseError::Serialization(e.to_string()))?;
        json_bytes(&value)
    }
}

/// A parsed working-tree file.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// A `.json` file with track structure.
    Track(TrackDocument),
    /// Any other valid JSON in a `.json` file.
    Json(Value),
    /// Everything else, stored verbatim.
    Raw(Vec<u8>),
}

impl Document {
    /// Classifies and parses file content. Never fails: anything that isn't
    /// recognizable JSON is raw bytes.
    pub fn parse(path: &str, bytes: &[u8]) -> Self {
        if !is_json_path(path) {
            return Document::Raw(bytes.to_vec());
        }

        if let Ok(track) = TrackDocument::from_json(bytes) {
            return Document::Track(track);
        }

        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Document::Json(value),
            Err(_) => Document::Raw(bytes.to_vec()),
        }
    }

    /// Serializes to the bytes stored in the object store.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Document::Track(track) => track.to_canonical_bytes(),
            Document::Json(value) => json_bytes(value),
            Document::Raw(bytes) => Ok(bytes.clone()),
        }
    }

    /// Returns the track model, if this is a track.
    pub fn as_track(&self) -> Option<&TrackDocument> {
        match self {
            Document::Track(track) => Some(track),
            _ => None,
        }
    }
}

/// Canonical form of a working-tree file.
///
/// Re-snapshotting unchanged content always yields the same bytes, no matter
/// how the file was formatted on disk.
pub fn canonicalize(path: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    Document::parse(path, bytes).to_canonical_bytes()
}

fn is_json_path(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("json"))
}

fn json_bytes(value: &Value) -> Result<Vec<u8>> {
    // serde_json's Map is ordered by key, so this output is deterministic
    let mut out =
        serde_json::to_vec_pretty(value).map_err(|e| MuseError::Serialization(e.to_string()))?;
    out.push(b'\n');
    Ok(out)
}
