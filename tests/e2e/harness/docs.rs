//! Builders for the documents scenarios commit.

use serde_json::{json, Value};

/// Ticks in one 4/4 bar at 480 ticks per quarter.
pub const BAR: u32 = 1920;

/// `project.json` with the given tempo.
pub fn project(tempo: u32) -> Vec<u8> {
    let value = json!({ "title": "Night Drive", "tempo": tempo, "time_signature": "4/4" });
    serde_json::to_vec_pretty(&value).unwrap_or_default()
}

/// A region; every note is a quarter note at velocity 90.
pub fn region(id: &str, start: u32, length: u32, notes: &[(u8, u32)]) -> Value {
    let notes: Vec<Value> = notes
        .iter()
        .map(|(pitch, onset)| {
            json!({ "pitch": pitch, "start": onset, "duration": 480, "velocity": 90 })
        })
        .collect();
    json!({ "id": id, "start": start, "length": length, "notes": notes })
}

/// A track document.
pub fn track(name: &str, regions: Vec<Value>) -> Vec<u8> {
    let value = json!({ "name": name, "regions": regions });
    serde_json::to_vec_pretty(&value).unwrap_or_default()
}

/// `tracks/keys.json` with a single four-bar `verse` region.
pub fn keys(notes: &[(u8, u32)]) -> Vec<u8> {
    track("keys", vec![region("verse", 0, 4 * BAR, notes)])
}
