//! Command implementations for the rigup CLI.

pub mod install;
pub mod verify;
pub mod version;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rigup_provision::orchestrator::InstallContext;
use rigup_provision::paths::InstallPaths;
use rigup_provision::plan::InstallPlan;
use rigup_provision::platform::Host;

/// Loads the plan and resolves everything a run needs.
///
/// `plan_override` wins over `RIGUP_PLAN` and the default location.
/// `exclusions` are appended to the plan's own exclusion prefixes.
pub(crate) fn load_context(
    plan_override: Option<&Path>,
    exclusions: &[String],
) -> Result<InstallContext> {
    let paths = InstallPaths::new()?;
    let plan_path: PathBuf = plan_override.map_or_else(|| paths.plan_file(), Path::to_path_buf);

    let mut plan = InstallPlan::load(&plan_path)
        .with_context(|| format!("Failed to load install plan {}", plan_path.display()))?;
    plan.add_exclusions(exclusions.iter().cloned());

    let host = Host::detect()?;
    InstallContext::new(plan, paths, host).context("Failed to resolve install paths")
}
