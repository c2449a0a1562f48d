//! CLI commands.

pub mod branch;
pub mod checkout;
pub mod commit;
pub mod diff;
pub mod init;
pub mod log;
pub mod merge;
pub mod remote;
pub mod status;
pub mod sync;
pub mod verify;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use muse_core::{Head, MuseError, MuseRepo, ObjectId};
use serde_json::{json, Value};
use std::io::IsTerminal;
use std::time::Duration;

/// Opens the repository containing the current directory.
pub fn open_repo() -> Result<MuseRepo> {
    MuseRepo::discover(".").context("Not a Muse repository")
}

/// Prints a JSON value on stdout.
pub fn emit(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Spinner on stderr, hidden for JSON output or when stderr is not a terminal.
pub fn spinner(message: &str, json: bool) -> ProgressBar {
    if json || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Local time of a Unix timestamp, or the raw number if out of range.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S %z")
                .to_string()
        })
        .unwrap_or_else(|| secs.to_string())
}

/// "branch main" or "detached at 1a2b3c4d".
pub fn describe_head(head: &Head) -> String {
    match head {
        Head::Branch(name) => format!("branch {}", name),
        Head::Detached(id) => format!("detached at {}", id.short()),
    }
}

pub fn head_json(head: &Head) -> Value {
    match head {
        Head::Branch(name) => json!({ "branch": name, "detached": false }),
        Head::Detached(id) => json!({ "commit": id, "detached": true }),
    }
}

pub fn short_or_none(id: Option<ObjectId>) -> String {
    id.map(|id| id.short()).unwrap_or_else(|| "(none)".to_string())
}

/// Structured error payload.
pub fn error_json(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<MuseError>() {
        Some(e) => json!({
            "error": e.code(),
            "message": e.to_string(),
            "paths": e.paths(),
            "hint": e.recovery_suggestion(),
        }),
        None => json!({
            "error": "error",
            "message": format!("{:#}", err),
            "paths": [],
            "hint": Value::Null,
        }),
    }
}

/// Prints a failed command's error: JSON on stdout, or styled text on stderr.
pub fn report_error(err: &anyhow::Error, json: bool) {
    if json {
        println!("{}", error_json(err));
        return;
    }

    eprintln!("{} {:#}", style("error:").red().bold(), err);
    if let Some(e) = err.downcast_ref::<MuseError>() {
        for path in e.paths() {
            eprintln!("    {}", style(path).yellow());
        }
        if let Some(hint) = e.recovery_suggestion() {
            eprintln!("{} {}", style("hint:").cyan(), hint);
        }
    }
}
