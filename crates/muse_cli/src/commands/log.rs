//! History display.

use super::{format_timestamp, open_repo};
use crate::LogFormat;
use anyhow::Result;
use console::style;
use muse_core::{render_ascii, render_dot, render_json};

/// Show history from `rev` (default: HEAD).
pub fn run(
    rev: Option<&str>,
    graph: bool,
    format: LogFormat,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let repo = open_repo()?;
    let entries = repo.log(rev, limit)?;

    let format = if json { LogFormat::Json } else { format };
    match format {
        LogFormat::Json => println!("{}", render_json(&entries)?),
        LogFormat::Dot => print!("{}", render_dot(&entries)),
        LogFormat::Text if graph => print!("{}", render_ascii(&entries, &repo.labels()?)),
        LogFormat::Text => {
            let labels = repo.labels()?;
            for entry in &entries {
                let decoration = labels
                    .get(&entry.id)
                    .map(|names| format!(" ({})", names.join(", ")))
                    .unwrap_or_default();
                println!(
                    "{}{}",
                    style(format!("commit {}", entry.id.as_hex())).yellow(),
                    style(decoration).cyan()
                );
                if entry.parents.len() > 1 {
                    let parents: Vec<String> = entry.parents.iter().map(|p| p.short()).collect();
                    println!("Merge:  {}", parents.join(" "));
                }
                println!("Author: {}", entry.author);
                println!("Date:   {}", format_timestamp(entry.timestamp));
                println!();
                for line in entry.message.lines() {
                    println!("    {}", line);
                }
                println!();
            }
        }
    }
    Ok(())
}
