//! Binary entry point: CLI parsing, logging setup, config load, then hand
//! off to the Supervisor.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use radar_ingest_client::config::Config;
use radar_ingest_client::supervisor;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "radar-ingest-client")]
#[command(about = "On-premise ingestion client for the radar surveillance pipeline")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override `database.file` from the config.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Wipe the embedded store before opening it.
    #[arg(long)]
    reset_db: bool,

    /// Raise the tracing filter to debug.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let cfg = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let db_path = args
        .db
        .unwrap_or_else(|| PathBuf::from(cfg.database.file.clone()));

    if args.reset_db && db_path.exists() {
        std::fs::remove_dir_all(&db_path)
            .with_context(|| format!("failed to reset store at {}", db_path.display()))?;
    }

    if let Err(e) = supervisor::run(cfg, db_path).await {
        tracing::error!(error = %e, "fatal bringup error");
        std::process::exit(1);
    }

    Ok(())
}
