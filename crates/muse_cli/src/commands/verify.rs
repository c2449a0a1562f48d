//! Repository verification command.

use super::{emit, open_repo, spinner};
use anyhow::Result;
use console::style;
use muse_core::VerifyConfig;
use serde_json::json;

/// Verify repository integrity.
pub fn run(objects: bool, json: bool) -> Result<()> {
    let repo = open_repo()?;

    let config = VerifyConfig {
        check_objects: objects,
        ..VerifyConfig::default()
    };

    let message = if objects {
        "Verifying every stored object..."
    } else {
        "Verifying history..."
    };
    let pb = spinner(message, json);
    let result = repo.verify(config);
    pb.finish_and_clear();
    let report = result?;

    if json {
        return emit(&json!({
            "healthy": !report.has_issues(),
            "summary": report.summary(),
            "report": report,
        }));
    }

    println!("{}", style("Verification Report:").bold());
    println!(
        "  Refs checked:       {}",
        style(report.refs_checked).cyan()
    );
    if !report.refs_dangling.is_empty() {
        println!(
            "  Dangling refs:      {}",
            style(report.refs_dangling.len()).yellow()
        );
        for name in &report.refs_dangling {
            println!("    {} {}", style("⚠").yellow(), name);
        }
    }
    println!(
        "  Commits checked:    {}",
        style(report.commits_checked).cyan()
    );
    println!(
        "  Objects checked:    {}",
        style(report.objects_checked).cyan()
    );
    if !report.objects_missing.is_empty() {
        println!(
            "  Missing objects:    {}",
            style(report.objects_missing.len()).red()
        );
        for id in &report.objects_missing {
            println!("    {} {}", style("?").red(), id.as_hex());
        }
    }
    if !report.objects_corrupted.is_empty() {
        println!(
            "  Corrupted objects:  {}",
            style(report.objects_corrupted.len()).red()
        );
        for id in &report.objects_corrupted {
            println!("    {} {}", style("×").red(), id.as_hex());
        }
    }

    println!();
    if !report.has_issues() {
        println!("{} {}", style("✓").green(), style(report.summary()).green());
        return Ok(());
    }

    println!("{}", style(report.summary()).yellow().bold());
    println!();
    println!("{}", style("Recommendations:").bold());
    if !report.objects_corrupted.is_empty() || !report.objects_missing.is_empty() {
        println!(
            "  {} Pull the affected branches from a remote that has intact objects",
            style("→").cyan()
        );
    }
    if !report.refs_dangling.is_empty() {
        println!(
            "  {} Dangling refs may indicate an interrupted operation",
            style("→").cyan()
        );
    }
    Ok(())
}
