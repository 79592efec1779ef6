//! `check` - Concourse check for Terraform Cloud drift detection
//!
//! Reads the resource input as JSON (stdin, or `--input`), inspects the
//! newest run of the workspace, queues a speculative plan when the polling
//! period has elapsed, and prints the version list on stdout.
//! Logs are written to stderr.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use drift_directory::TfeDirectory;
use tracing::{info, Level};

use drift_resource::{input, run_check, write_versions};

#[derive(Parser)]
#[command(name = "check")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect Terraform Cloud drift by polling workspace runs", long_about = None)]
struct Cli {
    /// Read the input document from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "TFE_DRIFT_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    drift_core::init_tracing(cli.json, level);

    let input = input::load(cli.input.as_deref())?;
    let target = input.target();
    info!(workspace = %target, "Starting drift check");

    let directory = TfeDirectory::new(input.tfe_config())
        .context("Failed to configure Terraform Cloud client")?;

    let versions = run_check(&input, Arc::new(directory))
        .await
        .with_context(|| format!("Drift check failed for {}", target))?;

    write_versions(io::stdout().lock(), &versions).context("Failed to write versions")?;
    Ok(())
}
