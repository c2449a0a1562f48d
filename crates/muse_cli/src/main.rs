//! Muse CLI - version control for music composition data.

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use muse_core::MuseError;
use std::process::ExitCode;

mod commands;

#[derive(Parser)]
#[command(name = "muse")]
#[command(about = "Version control for music composition data", long_about = None)]
#[command(version)]
struct Cli {
    /// Print results and errors as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository in the current directory
    Init,
    /// Show uncommitted changes and merge progress
    Status,
    /// Record the working tree as a new commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },
    /// List, create, or delete branches
    Branch {
        /// Branch to create at HEAD
        name: Option<String>,
        /// Delete this branch
        #[arg(short, long, value_name = "BRANCH", conflicts_with = "name")]
        delete: Option<String>,
    },
    /// Switch to a branch or commit
    Checkout {
        /// Branch, commit id, or id prefix
        target: String,
        /// Create the branch at the current commit first
        #[arg(short = 'b', long = "branch")]
        create: bool,
        /// Discard uncommitted changes
        #[arg(long)]
        force: bool,
    },
    /// Merge a branch into HEAD, or continue/abort a pending merge
    #[command(group(ArgGroup::new("mode").args(["rev", "continue", "abort"]).required(true)))]
    Merge {
        /// Revision to merge
        rev: Option<String>,
        /// Commit a fully resolved merge
        #[arg(id = "continue", long = "continue")]
        r#continue: bool,
        /// Abandon the pending merge
        #[arg(long)]
        abort: bool,
        /// Message for the merge commit (with --continue)
        #[arg(short, long, requires = "continue")]
        message: Option<String>,
    },
    /// Pick a side for a conflicted path
    #[command(group(ArgGroup::new("side").args(["ours", "theirs"]).required(true)))]
    Resolve {
        /// Conflicted path
        path: String,
        /// Keep the current branch's version
        #[arg(long)]
        ours: bool,
        /// Take the incoming version
        #[arg(long)]
        theirs: bool,
    },
    /// Show commit history
    Log {
        /// Start from this revision instead of HEAD
        rev: Option<String>,
        /// Draw the commit graph
        #[arg(long)]
        graph: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        format: LogFormat,
        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show note-level changes
    Diff {
        /// Old revision (default: HEAD)
        from: Option<String>,
        /// New revision (default: the working tree)
        to: Option<String>,
    },
    /// Manage remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Upload a branch to a remote
    Push {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
        /// Branch to push (default: current)
        #[arg(long)]
        branch: Option<String>,
        /// Overwrite the remote branch even if it diverged
        #[arg(long)]
        force: bool,
    },
    /// Fetch a branch from a remote and integrate it
    Pull {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
        /// Branch to pull
        #[arg(long)]
        branch: String,
    },
    /// Verify repository integrity
    Verify {
        /// Also check unreachable objects (slow)
        #[arg(long)]
        objects: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init => "init",
            Commands::Status => "status",
            Commands::Commit { .. } => "commit",
            Commands::Branch { .. } => "branch",
            Commands::Checkout { .. } => "checkout",
            Commands::Merge { .. } => "merge",
            Commands::Resolve { .. } => "resolve",
            Commands::Log { .. } => "log",
            Commands::Diff { .. } => "diff",
            Commands::Remote { .. } => "remote",
            Commands::Push { .. } => "push",
            Commands::Pull { .. } => "pull",
            Commands::Verify { .. } => "verify",
        }
    }
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Add a remote
    Add {
        /// Remote name
        name: String,
        /// Hub repository URL or local directory
        url: String,
    },
    /// List remotes
    List,
    /// Remove a remote and its tracking refs
    Remove {
        /// Remote name
        name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
    Dot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            commands::report_error(&err, json);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    tracing::debug!(command = cli.command.name(), "dispatching");
    match cli.command {
        Commands::Init => commands::init::run(json),
        Commands::Status => commands::status::run(json),
        Commands::Commit { message } => commands::commit::run(&message, json),
        Commands::Branch { name, delete } => match (name, delete) {
            (_, Some(branch)) => commands::branch::delete(&branch, json),
            (Some(name), None) => commands::branch::create(&name, json),
            (None, None) => commands::branch::list(json),
        },
        Commands::Checkout {
            target,
            create,
            force,
        } => commands::checkout::run(&target, create, force, json),
        Commands::Merge {
            rev,
            r#continue,
            abort,
            message,
        } => {
            if r#continue {
                commands::merge::continue_merge(message.as_deref(), json)
            } else if abort {
                commands::merge::abort(json)
            } else {
                commands::merge::run(rev.as_deref().unwrap_or("HEAD"), json)
            }
        }
        Commands::Resolve { path, ours, .. } => commands::merge::resolve(&path, ours, json),
        Commands::Log {
            rev,
            graph,
            format,
            limit,
        } => commands::log::run(rev.as_deref(), graph, format, limit, json),
        Commands::Diff { from, to } => commands::diff::run(from.as_deref(), to.as_deref(), json),
        Commands::Remote { command } => match command {
            RemoteCommands::Add { name, url } => commands::remote::add(&name, &url, json),
            RemoteCommands::List => commands::remote::list(json),
            RemoteCommands::Remove { name } => commands::remote::remove(&name, json),
        },
        Commands::Push {
            remote,
            branch,
            force,
        } => commands::sync::push(&remote, branch.as_deref(), force, json),
        Commands::Pull { remote, branch } => commands::sync::pull(&remote, &branch, json),
        Commands::Verify { objects } => commands::verify::run(objects, json),
    }
}

/// Maps an error to the process exit code.
///
/// 1 merge conflict, 2 drift, 3 repository busy, 4 remote failure,
/// 5 anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MuseError>() {
        Some(MuseError::MergeConflict { .. } | MuseError::UnresolvedConflicts { .. }) => 1,
        Some(MuseError::DriftDetected { .. }) => 2,
        Some(MuseError::RepositoryBusy { .. }) => 3,
        Some(
            MuseError::RemoteUnreachable(_)
            | MuseError::RemoteRejected { .. }
            | MuseError::RemoteNotFound(_),
        ) => 4,
        _ => 5,
    }
}
