//! Note-level diff command.

use super::{emit, open_repo};
use anyhow::Result;
use console::style;
use muse_core::{ChangeKind, DocumentDiff, PathChange, RegionChange};
use serde_json::json;

/// Show changes between two revisions, a revision and the working tree,
/// or HEAD and the working tree.
pub fn run(from: Option<&str>, to: Option<&str>, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let changes = repo.diff(from, to)?;

    if json {
        return emit(&json!({ "changes": changes }));
    }

    if changes.is_empty() {
        println!("No changes.");
        return Ok(());
    }
    print_changes(&changes);
    Ok(())
}

/// Prints path changes with note detail, shared with `status`.
pub fn print_changes(changes: &[PathChange]) {
    for change in changes {
        let marker = match change.kind {
            ChangeKind::Added => style("added:   ").green(),
            ChangeKind::Removed => style("removed: ").red(),
            ChangeKind::Modified => style("modified:").yellow(),
        };
        match &change.document {
            Some(doc) if doc.note_count() > 0 => println!(
                "  {} {} ({} note changes)",
                marker,
                change.path,
                doc.note_count()
            ),
            _ => println!("  {} {}", marker, change.path),
        }
        if let Some(doc) = &change.document {
            print_document(doc);
        }
    }
}

fn print_document(doc: &DocumentDiff) {
    if doc.track_changed {
        println!("      track metadata changed");
    }
    for region in &doc.region_changes {
        let line = match region {
            RegionChange::Added(id) => format!("region {} added", id),
            RegionChange::Removed(id) => format!("region {} removed", id),
            RegionChange::Moved(id) => format!("region {} moved", id),
        };
        println!("      {}", line);
    }
    for phrase in &doc.phrases {
        println!("      {}", style(&phrase.phrase).bold());
        for change in &phrase.changes {
            let text = change.to_string();
            let styled = match text.chars().next() {
                Some('+') => style(text).green(),
                Some('-') => style(text).red(),
                _ => style(text).yellow(),
            };
            println!("        {}", styled);
        }
    }
}
