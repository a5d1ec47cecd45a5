//! Verify command for the rigup CLI.
//!
//! Runs the verification catalog against what is on disk. Nothing is
//! downloaded, extracted or written.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use rigup_provision::orchestrator::verify_installation;

use super::load_context;
use crate::errors::CliError;

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Install plan to use instead of RIGUP_PLAN or the default location.
    #[clap(long = "plan", value_name = "FILE")]
    pub plan: Option<PathBuf>,
}

/// Executes the verify command.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded, or
/// [`CliError::VerificationFailed`] when any check fails.
pub fn execute(args: &VerifyArgs) -> Result<()> {
    let mut ctx = load_context(args.plan.as_deref(), &[])?;
    println!(
        "Verifying {} in {}...",
        ctx.plan.install.name,
        ctx.paths.install.display()
    );

    let (registry, report) = verify_installation(&mut ctx);
    println!();
    println!("Components:");
    for line in registry.to_string().lines() {
        println!("  {line}");
    }
    println!();
    println!("{}", report.render());

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::VerificationFailed {
            failed: report.failed(),
            total: report.total(),
        }
        .into())
    }
}
