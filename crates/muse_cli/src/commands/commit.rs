//! Commit command.

use super::{emit, open_repo};
use anyhow::Result;
use console::style;
use serde_json::json;

/// Snapshot the working tree as a new commit on HEAD.
pub fn run(message: &str, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let id = repo.commit(message)?;
    let branch = repo.current_branch()?;

    if json {
        return emit(&json!({ "commit": id, "branch": branch }));
    }

    match branch {
        Some(branch) => println!("[{} {}] {}", style(branch).green(), id.short(), message),
        None => println!("[detached {}] {}", id.short(), message),
    }
    Ok(())
}
