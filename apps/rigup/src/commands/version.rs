//! Version command for the rigup CLI.

use anyhow::Result;

/// Prints the version; with `verbose`, also commit and platform.
#[allow(clippy::unnecessary_wraps)]
pub fn execute(verbose: bool) -> Result<()> {
    println!("rigup {}", env!("CARGO_PKG_VERSION"));
    if verbose {
        println!();
        println!("Build Information:");
        println!("  Version:  {}", env!("CARGO_PKG_VERSION"));
        println!("  Commit:   {}", git_commit());
        println!("  Platform: {}", platform_string());
    }
    Ok(())
}

fn git_commit() -> &'static str {
    option_env!("RIGUP_GIT_COMMIT").unwrap_or("unknown")
}

fn platform_string() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
