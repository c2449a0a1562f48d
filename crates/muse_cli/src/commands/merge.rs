//! Merge, conflict resolution, continue and abort.

use super::{emit, open_repo};
use anyhow::Result;
use console::style;
use muse_core::{MergeOutcome, MuseError, PathConflict, Resolution};
use serde_json::json;

/// Merge a revision into HEAD.
pub fn run(rev: &str, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let outcome = repo.merge(rev)?;
    report_outcome(&outcome, rev, json)
}

/// Prints a merge or pull outcome. Conflicts become a `MergeConflict` error
/// so the process exits non-zero.
pub fn report_outcome(outcome: &MergeOutcome, label: &str, json: bool) -> Result<()> {
    match outcome {
        MergeOutcome::Conflicted(conflicts) => {
            if !json {
                println!("Merging {} stopped on conflicts:", style(label).bold());
                for conflict in conflicts {
                    print_conflict(conflict);
                }
                println!();
            }
            Err(MuseError::MergeConflict {
                paths: outcome.conflict_paths(),
            }
            .into())
        }
        _ if json => emit(&outcome_json(outcome)),
        MergeOutcome::UpToDate => {
            println!("Already up to date.");
            Ok(())
        }
        MergeOutcome::FastForward(id) => {
            println!("Fast-forward to {}", id.short());
            Ok(())
        }
        MergeOutcome::Merged(id) => {
            println!("Merged {} as {}", label, style(id.short()).green());
            Ok(())
        }
    }
}

pub fn outcome_json(outcome: &MergeOutcome) -> serde_json::Value {
    match outcome {
        MergeOutcome::UpToDate => json!({ "outcome": "up_to_date" }),
        MergeOutcome::FastForward(id) => json!({ "outcome": "fast_forward", "commit": id }),
        MergeOutcome::Merged(id) => json!({ "outcome": "merged", "commit": id }),
        MergeOutcome::Conflicted(conflicts) => {
            json!({ "outcome": "conflicted", "conflicts": conflicts })
        }
    }
}

fn print_conflict(conflict: &PathConflict) {
    println!(
        "  {} {} ({:?})",
        style("conflict:").red(),
        conflict.path,
        conflict.kind
    );
    for phrase in &conflict.phrases {
        println!("      {}", style(&phrase.phrase).bold());
        for change in &phrase.ours {
            println!("        ours   {}", change);
        }
        for change in &phrase.theirs {
            println!("        theirs {}", change);
        }
    }
}

/// Pick a side for one conflicted path.
pub fn resolve(path: &str, ours: bool, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let resolution = if ours {
        Resolution::Ours
    } else {
        Resolution::Theirs
    };
    let remaining = repo.resolve(path, resolution)?;

    if json {
        return emit(&json!({ "resolved": path, "side": resolution, "remaining": remaining }));
    }

    println!("Resolved {} using {:?}", path, resolution);
    if remaining.is_empty() {
        println!("All conflicts resolved; run \"muse merge --continue\".");
    } else {
        println!("{} path(s) still in conflict:", remaining.len());
        for path in &remaining {
            println!("    {}", style(path).yellow());
        }
    }
    Ok(())
}

/// Commit a fully resolved merge.
pub fn continue_merge(message: Option<&str>, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let id = repo.merge_continue(message)?;

    if json {
        return emit(&json!({ "outcome": "merged", "commit": id }));
    }
    println!("Merge committed as {}", style(id.short()).green());
    Ok(())
}

/// Abandon the pending merge.
pub fn abort(json: bool) -> Result<()> {
    let repo = open_repo()?;
    repo.merge_abort()?;

    if json {
        return emit(&json!({ "aborted": true }));
    }
    println!("Merge aborted.");
    Ok(())
}
