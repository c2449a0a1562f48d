//! Working-tree status.

use super::diff::print_changes;
use super::{describe_head, emit, head_json, open_repo};
use anyhow::Result;
use console::style;
use serde_json::json;

/// Show HEAD, merge progress, and uncommitted changes.
pub fn run(json: bool) -> Result<()> {
    let repo = open_repo()?;
    let status = repo.status()?;

    if json {
        let merge = status.merge.as_ref().map(|state| {
            json!({
                "theirs": state.theirs,
                "conflicts": state.conflicts,
                "unresolved": state.conflict_paths,
                "resolved": state.resolved,
            })
        });
        return emit(&json!({
            "head": head_json(&status.head),
            "commit": status.commit,
            "clean": status.is_clean(),
            "changes": status.changes,
            "merge": merge,
        }));
    }

    println!("On {}", describe_head(&status.head));
    if status.commit.is_none() {
        println!("No commits yet");
    }

    if let Some(state) = &status.merge {
        println!();
        println!("{} {}", style("Merging").bold(), state.theirs);
        for conflict in &state.conflicts {
            let path = &conflict.path;
            match state.resolved.get(path) {
                Some(resolution) => println!(
                    "  {} {} ({:?})",
                    style("resolved:").green(),
                    path,
                    resolution
                ),
                None => println!("  {} {}", style("conflict:").red(), path),
            }
        }
        println!("  (use \"muse resolve <path> --ours|--theirs\", then \"muse merge --continue\")");
    }

    println!();
    if status.is_clean() {
        println!("Working tree clean");
    } else {
        println!("Changes not committed:");
        print_changes(&status.changes);
    }
    Ok(())
}
