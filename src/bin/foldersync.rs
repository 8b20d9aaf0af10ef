//! # foldersync CLI
//!
//! Mirrors a source directory onto a replica directory every `interval`
//! seconds until the process is killed.
//!
//! ## Usage
//! ```bash
//! foldersync ./source ./replica 30 ./sync.log
//! ```
//!
//! Log lines go to standard output and are appended to the log file.
//! Set `RUST_LOG=debug` for per-cycle statistics.

use clap::Parser;
use colored::*;
use foldersync::logging::init_logging;
use foldersync::{Result, SyncConfig, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// foldersync - one-way periodic directory mirroring
#[derive(Parser)]
#[command(name = "foldersync")]
#[command(version)]
#[command(about = "Synchronize two folders: keep a replica identical to a source")]
#[command(long_about = None)]
struct Cli {
    /// Path to the source folder
    source: PathBuf,

    /// Path to the replica folder (created if absent)
    replica: PathBuf,

    /// Synchronization interval in seconds
    interval: u64,

    /// Path to the log file
    log_file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Validate, set up logging, and mirror until a fatal error
fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::new(
        cli.source,
        cli.replica,
        Duration::from_secs(cli.interval),
        cli.log_file,
    );

    init_logging(&config.log_file)?;
    config.validate().inspect_err(|e| tracing::error!("{}", e))?;

    let sink = Arc::new(TracingSink::new());
    config.scheduler(sink).run()
}
