//! Checkout command.

use super::{describe_head, emit, head_json, open_repo};
use anyhow::Result;
use serde_json::json;

/// Switch the working tree to a branch or commit.
///
/// With `create`, a new branch is made at the current commit and checked
/// out; the working tree is left as it is.
pub fn run(target: &str, create: bool, force: bool, json: bool) -> Result<()> {
    let repo = open_repo()?;

    let head = if create {
        repo.checkout_new_branch(target)?;
        repo.head()?
    } else {
        repo.checkout(target, force)?
    };

    if json {
        return emit(&json!({ "head": head_json(&head), "commit": repo.head_commit()? }));
    }

    if create {
        println!("Switched to a new branch '{}'", target);
    } else {
        println!("Switched to {}", describe_head(&head));
    }
    Ok(())
}
