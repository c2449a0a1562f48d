//! Muse Hub server binary.

use clap::Parser;
use muse_hub::{serve, HubConfig};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "muse-hub")]
#[command(about = "Hosts Muse repositories for push, pull, issues and pull requests", long_about = None)]
#[command(version)]
struct Args {
    /// Directory holding one repository per id
    #[arg(long, env = "MUSE_HUB_ROOT", default_value = "hub-data")]
    root: PathBuf,

    /// Address to listen on
    #[arg(long, env = "MUSE_HUB_BIND", default_value = "127.0.0.1:7878")]
    bind: String,

    /// Bearer token required on repository routes
    #[arg(long, env = "MUSE_HUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.token.is_none() {
        tracing::warn!("no token configured; repository routes are open");
    }

    let listener = TcpListener::bind(&args.bind).await?;
    serve(
        listener,
        HubConfig {
            root: args.root,
            token: args.token,
        },
    )
    .await?;
    Ok(())
}
