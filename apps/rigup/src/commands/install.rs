//! Install command for the rigup CLI.
//!
//! ## Usage
//!
//! ```bash
//! rigup install                                # Plan from RIGUP_PLAN or ~/.rigup/rigup.toml
//! rigup install --plan ./toolchain.toml        # Explicit plan
//! rigup install --exclude plugins/emulator/    # Skip a subtree of the primary archive
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rigup_provision::archive::{ExtractProgress, ExtractProgressCallback};
use rigup_provision::download::{
    HttpFetcher, ProgressCallback, ProgressEvent, format_bytes, format_speed,
};
use rigup_provision::orchestrator::{Orchestrator, RunSummary};
use rigup_provision::prereq::Fs2DiskProbe;

use super::load_context;
use crate::errors::CliError;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Install plan to use instead of RIGUP_PLAN or the default location.
    #[clap(long = "plan", value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Entry prefix of the primary archive to leave out (repeatable).
    #[clap(long = "exclude", value_name = "PREFIX")]
    pub exclude: Vec<String>,

    /// Suppress download and extraction progress.
    #[clap(short = 'q', long = "quiet", action = clap::ArgAction::SetTrue)]
    pub quiet: bool,
}

/// Executes the install command.
///
/// # Errors
///
/// Returns the phase failure that halted the run, or
/// [`CliError::VerificationFailed`] when the install finished but some
/// checks failed.
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let mut ctx = load_context(args.plan.as_deref(), &args.exclude)?;
    println!(
        "Installing {} into {} ({})...",
        ctx.plan.install.name,
        ctx.paths.install.display(),
        ctx.host
    );

    let fetcher = HttpFetcher::new()?;
    let disk = Fs2DiskProbe;
    let orchestrator = if args.quiet {
        Orchestrator::new(&fetcher, &disk)
    } else {
        Orchestrator::new(&fetcher, &disk)
            .with_download_progress(Some(download_progress()))
            .with_extract_progress(Some(extract_progress()))
    };

    let summary = orchestrator.run(&mut ctx).await?;
    print_summary(&summary);

    let report = &summary.verification;
    if !report.all_passed() {
        return Err(CliError::VerificationFailed {
            failed: report.failed(),
            total: report.total(),
        }
        .into());
    }
    println!("{} installed successfully.", ctx.plan.install.name);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    for (phase, outcome) in &summary.phases {
        println!("  {phase:<26} {outcome}");
    }
    if let Some(settings) = &summary.settings
        && !settings.changed_keys.is_empty()
    {
        println!();
        println!("Updated settings: {}", settings.changed_keys.join(", "));
    }
    println!();
    println!("Components:");
    for line in summary.registry.to_string().lines() {
        println!("  {line}");
    }
    println!();
    println!("{}", summary.verification.render());
}

fn download_progress() -> ProgressCallback {
    Arc::new(|event| match event {
        ProgressEvent::Started {
            url, resumed_from, ..
        } => {
            if resumed_from > 0 {
                println!("Resuming {url} at {}...", format_bytes(resumed_from));
            } else {
                println!("Downloading {url}...");
            }
        }
        ProgressEvent::Progress { downloaded, speed } => {
            print!("\r{} {}     ", format_bytes(downloaded), format_speed(speed));
            let _ = std::io::stdout().flush();
        }
        ProgressEvent::Completed => println!(),
        ProgressEvent::Failed { error } => eprintln!("\nDownload failed: {error}"),
    })
}

fn extract_progress() -> ExtractProgressCallback {
    Arc::new(|progress: ExtractProgress| {
        print!(
            "\rExtracting... {}% ({}/{})",
            progress.percent, progress.processed, progress.total
        );
        if progress.processed >= progress.total {
            println!();
        }
        let _ = std::io::stdout().flush();
    })
}
