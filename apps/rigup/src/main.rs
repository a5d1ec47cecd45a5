#![warn(clippy::pedantic)]

//! # rigup
//!
//! Installs and verifies a multi-component developer toolchain described by
//! an install plan.
//!
//! ## Subcommands
//!
//! - `install` - Run every install phase, then verify
//! - `verify` - Verify an existing installation without changing it
//! - `version` - Display version information
//!
//! ## Exit codes
//!
//! - `0` - Success, every verification check passed
//! - `1` - A phase failed; one diagnostic line names the phase and resource
//! - `2` - The install ran but verification found problems
//!
//! ## Examples
//!
//! Install from the default plan (`~/.rigup/rigup.toml`):
//! ```bash
//! rigup install
//! ```
//!
//! Install without the bundled emulator images:
//! ```bash
//! rigup install --exclude plugins/emulator/
//! ```

mod commands;
mod errors;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{install, verify, version};
use errors::CliError;
use tracing_subscriber::EnvFilter;

/// Multi-component toolchain installer.
#[derive(Parser)]
#[command(
    name = "rigup",
    author,
    version,
    about = "Installs and verifies a multi-component developer toolchain",
    after_help = "\
ENVIRONMENT VARIABLES:
    RIGUP_HOME              Root directory (default: ~/.rigup)
    RIGUP_PLAN              Install plan file (default: $RIGUP_HOME/rigup.toml)
    RUST_LOG                Log filter, overrides --verbose"
)]
pub struct Cli {
    /// Log phase transitions and per-artifact detail.
    #[clap(short = 'v', long = "verbose", global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the rigup CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install the toolchain.
    ///
    /// Runs every phase in order. Work already present on disk is detected
    /// and skipped, so rerunning after a failure resumes where it stopped.
    Install(install::InstallArgs),

    /// Verify an existing installation.
    ///
    /// Runs the verification checks against the current filesystem and
    /// prints a pass/fail report without modifying anything.
    Verify(verify::VerifyArgs),

    /// Display version information.
    ///
    /// Use the global --verbose flag for commit and platform details.
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over
/// `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Prints one diagnostic line and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(cli_error) = e.downcast_ref::<CliError>() {
        eprintln!("Error: {cli_error}");
        return cli_error.exit_code();
    }
    eprintln!("Error: {e:#}");
    1
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install(args) => install::execute(&args).await,
        Commands::Verify(args) => verify::execute(&args),
        Commands::Version => version::execute(cli.verbose),
    }
}
