//! Remote configuration.

use super::{emit, open_repo};
use anyhow::Result;
use console::style;
use serde_json::json;

pub fn add(name: &str, url: &str, json: bool) -> Result<()> {
    let mut repo = open_repo()?;
    repo.remote_add(name, url)?;

    if json {
        return emit(&json!({ "added": name, "url": url }));
    }
    println!("Added remote {} -> {}", style(name).green(), url);
    Ok(())
}

pub fn list(json: bool) -> Result<()> {
    let repo = open_repo()?;
    let remotes = repo.remotes();

    if json {
        let entries: Vec<_> = remotes
            .iter()
            .map(|(name, remote)| {
                json!({
                    "name": name,
                    "url": remote.url,
                    "token": remote.effective_token().is_some(),
                })
            })
            .collect();
        return emit(&json!({ "remotes": entries }));
    }

    if remotes.is_empty() {
        println!("No remotes configured.");
    }
    for (name, remote) in &remotes {
        println!("{}\t{}", name, remote.url);
    }
    Ok(())
}

/// Remove a remote and its tracking refs.
pub fn remove(name: &str, json: bool) -> Result<()> {
    let mut repo = open_repo()?;
    repo.remote_remove(name)?;

    if json {
        return emit(&json!({ "removed": name }));
    }
    println!("Removed remote {}", name);
    Ok(())
}
