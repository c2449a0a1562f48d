//! Push and pull.

use super::merge::{outcome_json, report_outcome};
use super::{emit, open_repo, spinner};
use anyhow::Result;
use console::style;
use muse_core::MergeOutcome;
use serde_json::json;

/// Upload a branch and its missing objects to a remote.
pub fn push(remote: &str, branch: Option<&str>, force: bool, json: bool) -> Result<()> {
    let repo = open_repo()?;

    let pb = spinner(&format!("Pushing to {}...", remote), json);
    let result = repo.push(remote, branch, force);
    pb.finish_and_clear();
    let report = result?;

    if json {
        return emit(&json!({
            "remote": report.remote,
            "branch": report.branch,
            "head": report.head,
            "objects_sent": report.objects_sent,
            "up_to_date": report.up_to_date,
        }));
    }

    if report.up_to_date {
        println!("Everything up to date.");
    } else {
        println!(
            "{} {} -> {}/{} ({} objects)",
            style("Pushed").green(),
            report.head.short(),
            report.remote,
            report.branch,
            report.objects_sent
        );
    }
    Ok(())
}

/// Fetch a branch from a remote and integrate it.
pub fn pull(remote: &str, branch: &str, json: bool) -> Result<()> {
    let repo = open_repo()?;

    let pb = spinner(&format!("Pulling {}/{}...", remote, branch), json);
    let result = repo.pull(remote, branch);
    pb.finish_and_clear();
    let report = result?;

    if json && !matches!(report.outcome, MergeOutcome::Conflicted(_)) {
        let mut value = outcome_json(&report.outcome);
        value["remote"] = json!(report.remote);
        value["branch"] = json!(report.branch);
        value["head"] = json!(report.head);
        value["objects_received"] = json!(report.objects_received);
        return emit(&value);
    }

    if !json {
        println!(
            "Received {} objects from {}/{} ({})",
            report.objects_received,
            report.remote,
            report.branch,
            report.head.short()
        );
    }
    let label = format!("{}/{}", report.remote, report.branch);
    report_outcome(&report.outcome, &label, json)
}
