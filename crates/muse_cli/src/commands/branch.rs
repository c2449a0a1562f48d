//! Branch management.

use super::{emit, open_repo};
use anyhow::Result;
use console::style;
use serde_json::json;

/// List local branches, marking the current one.
pub fn list(json: bool) -> Result<()> {
    let repo = open_repo()?;
    let current = repo.current_branch()?;
    let branches = repo.branches()?;

    if json {
        let entries: Vec<_> = branches
            .iter()
            .map(|(name, id)| {
                json!({ "name": name, "head": id, "current": current.as_deref() == Some(name) })
            })
            .collect();
        return emit(&json!({ "branches": entries }));
    }

    if branches.is_empty() {
        println!("No branches yet (commit first).");
    }
    for (name, id) in &branches {
        if current.as_deref() == Some(name.as_str()) {
            println!("* {} {}", style(name).green(), style(id.short()).dim());
        } else {
            println!("  {} {}", name, style(id.short()).dim());
        }
    }
    Ok(())
}

/// Create a branch at HEAD without switching to it.
pub fn create(name: &str, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let id = repo.branch_create(name, None)?;

    if json {
        return emit(&json!({ "created": name, "head": id }));
    }
    println!("Created branch {} at {}", style(name).green(), id.short());
    Ok(())
}

/// Delete a branch other than the current one.
pub fn delete(name: &str, json: bool) -> Result<()> {
    let repo = open_repo()?;
    let id = repo.branch_delete(name)?;

    if json {
        return emit(&json!({ "deleted": name, "head": id }));
    }
    println!("Deleted branch {} (was {})", name, id.short());
    Ok(())
}
