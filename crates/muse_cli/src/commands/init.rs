//! Initialize a new Muse repository.

use super::emit;
use anyhow::{Context, Result};
use muse_core::{MuseRepo, DEFAULT_BRANCH};
use serde_json::json;

/// Initialize a new Muse repository in the current directory.
pub fn run(json: bool) -> Result<()> {
    let repo = MuseRepo::init(".").context("Failed to initialize Muse repository")?;
    let info = repo.info()?;

    if json {
        return emit(&json!({
            "repo_id": info.repo_id,
            "branch": DEFAULT_BRANCH,
            "format_version": info.format_version,
        }));
    }

    println!("Initialized Muse repository in .muse/");
    println!();
    println!("Directory structure:");
    println!("  .muse/objects/      - Content-addressed object storage");
    println!("  .muse/refs/heads/   - Branch pointers");
    println!("  .muse/refs/remotes/ - Remote-tracking pointers");
    println!();
    println!("Configuration written to .muse/config.toml");
    println!("Repository id: {}", info.repo_id);
    println!("On branch {} (no commits yet)", DEFAULT_BRANCH);

    Ok(())
}
