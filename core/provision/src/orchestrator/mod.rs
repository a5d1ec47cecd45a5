//! Phase sequencing for one installation run.
//!
//! ```text
//! prereq -> acquire -> extract-primary -> install-secondary-runtime
//!        -> warm-caches -> post-process -> install-extensions
//!        -> merge-config -> apply-environment -> verify -> done
//! ```
//!
//! Every phase first derives from disk whether its target is already
//! satisfied and skips if so, removes and redoes a target it finds
//! half-built, and otherwise does its work. A phase that cannot proceed
//! returns a [`PhaseFailure`] and the run stops there. Work of completed
//! phases stays on disk, so running again picks up where the failed run
//! stopped.

mod phases;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::archive::{ExtractProgressCallback, ExtractionReport, SubtreeStatus};
use crate::cache::CacheOutcome;
use crate::download::{Fetcher, ProgressCallback};
use crate::environment::EnvTarget;
use crate::errors::ProvisionError;
use crate::paths::InstallPaths;
use crate::plan::{InstallPlan, Variables};
use crate::platform::Host;
use crate::prereq::DiskProbe;
use crate::registry::{ComponentRegistry, RegistryReport};
use crate::settings::MergeReport;
use crate::verify::VerificationReport;

/// One step of an installation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prereq,
    Acquire,
    ExtractPrimary,
    InstallSecondaryRuntime,
    WarmCaches,
    PostProcess,
    InstallExtensions,
    MergeConfig,
    ApplyEnvironment,
    Verify,
    Done,
}

impl Phase {
    /// Every phase in execution order.
    pub const SEQUENCE: [Phase; 11] = [
        Phase::Prereq,
        Phase::Acquire,
        Phase::ExtractPrimary,
        Phase::InstallSecondaryRuntime,
        Phase::WarmCaches,
        Phase::PostProcess,
        Phase::InstallExtensions,
        Phase::MergeConfig,
        Phase::ApplyEnvironment,
        Phase::Verify,
        Phase::Done,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prereq => "prereq",
            Self::Acquire => "acquire",
            Self::ExtractPrimary => "extract-primary",
            Self::InstallSecondaryRuntime => "install-secondary-runtime",
            Self::WarmCaches => "warm-caches",
            Self::PostProcess => "post-process",
            Self::InstallExtensions => "install-extensions",
            Self::MergeConfig => "merge-config",
            Self::ApplyEnvironment => "apply-environment",
            Self::Verify => "verify",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The phase did its work.
    Completed,
    /// The target was already satisfied.
    Skipped(String),
    /// A stale or partial target was removed and rebuilt.
    Remediated(String),
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Remediated(what) => write!(f, "remediated ({what})"),
        }
    }
}

/// A fatal error, tagged with the phase that raised it.
#[derive(Debug, Error)]
#[error("{phase} phase failed: {error}")]
pub struct PhaseFailure {
    pub phase: Phase,
    pub error: ProvisionError,
}

/// Everything a run reads and builds, passed explicitly to every phase.
#[derive(Debug)]
pub struct InstallContext {
    pub plan: InstallPlan,
    pub paths: InstallPaths,
    pub host: Host,
    pub vars: Variables,
    pub env_target: Option<EnvTarget>,
    pub registry: ComponentRegistry,
    acquired: BTreeMap<String, PathBuf>,
}

impl InstallContext {
    /// Builds a context, resolving the environment target from the plan's
    /// `environment.profile` or the detected shell.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` if the profile path uses an unknown placeholder.
    pub fn new(plan: InstallPlan, paths: InstallPaths, host: Host) -> Result<Self, ProvisionError> {
        let vars = Variables::derive(&plan, &paths);
        let profile = plan
            .environment
            .profile
            .as_deref()
            .map(|p| vars.expand_path(p))
            .transpose()?;
        let env_target = EnvTarget::resolve(profile.as_deref());
        Ok(Self {
            plan,
            paths,
            host,
            vars,
            env_target,
            registry: ComponentRegistry::new(),
            acquired: BTreeMap::new(),
        })
    }

    /// Replaces the resolved environment target.
    #[must_use]
    pub fn with_env_target(mut self, target: Option<EnvTarget>) -> Self {
        self.env_target = target;
        self
    }

    /// Returns the cached path of an artifact acquired in this run.
    #[must_use]
    pub fn acquired(&self, artifact: &str) -> Option<&Path> {
        self.acquired.get(artifact).map(PathBuf::as_path)
    }
}

/// What one run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub phases: Vec<(Phase, PhaseOutcome)>,
    pub downloads: Vec<CacheOutcome>,
    /// Extraction reports keyed by what was extracted.
    pub extractions: Vec<(String, ExtractionReport)>,
    pub checklist: Vec<SubtreeStatus>,
    pub settings: Option<MergeReport>,
    pub registry: RegistryReport,
    pub verification: VerificationReport,
}

impl RunSummary {
    /// Returns the outcome recorded for `phase`.
    #[must_use]
    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, outcome)| outcome)
    }
}

/// Drives the phases of one run.
pub struct Orchestrator<'a, F: Fetcher> {
    fetcher: &'a F,
    disk: &'a dyn DiskProbe,
    download_progress: Option<ProgressCallback>,
    extract_progress: Option<ExtractProgressCallback>,
}

impl<'a, F: Fetcher> Orchestrator<'a, F> {
    #[must_use]
    pub fn new(fetcher: &'a F, disk: &'a dyn DiskProbe) -> Self {
        Self {
            fetcher,
            disk,
            download_progress: None,
            extract_progress: None,
        }
    }

    #[must_use]
    pub fn with_download_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.download_progress = callback;
        self
    }

    #[must_use]
    pub fn with_extract_progress(mut self, callback: Option<ExtractProgressCallback>) -> Self {
        self.extract_progress = callback;
        self
    }

    /// Runs every phase in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`PhaseFailure`]; later phases do not run.
    pub async fn run(&self, ctx: &mut InstallContext) -> Result<RunSummary, PhaseFailure> {
        let mut summary = RunSummary::default();

        for phase in Phase::SEQUENCE {
            info!(%phase, "phase started");
            let outcome = self
                .run_phase(phase, ctx, &mut summary)
                .await
                .map_err(|error| PhaseFailure { phase, error })?;
            info!(%phase, %outcome, "phase finished");
            summary.phases.push((phase, outcome));
        }

        summary.registry = ctx.registry.report();
        Ok(summary)
    }

    async fn run_phase(
        &self,
        phase: Phase,
        ctx: &mut InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        match phase {
            Phase::Prereq => self.prereq(ctx),
            Phase::Acquire => self.acquire(ctx, summary).await,
            Phase::ExtractPrimary => self.extract_primary(ctx, summary),
            Phase::InstallSecondaryRuntime => self.install_secondary_runtime(ctx, summary),
            Phase::WarmCaches => self.warm_caches(ctx, summary),
            Phase::PostProcess => Ok(Self::post_process(ctx)),
            Phase::InstallExtensions => self.install_extensions(ctx, summary),
            Phase::MergeConfig => Self::merge_config(ctx, summary),
            Phase::ApplyEnvironment => Self::apply_environment(ctx),
            Phase::Verify => Ok(Self::verify(ctx, summary)),
            Phase::Done => Ok(PhaseOutcome::Completed),
        }
    }
}

/// Verifies an existing installation without changing anything.
///
/// The component registry is rebuilt from disk so the report matches what
/// an install run would have recorded.
#[must_use]
pub fn verify_installation(ctx: &mut InstallContext) -> (RegistryReport, VerificationReport) {
    phases::record_installed(ctx);
    let checks = crate::checks::standard_checks(
        &ctx.plan,
        &ctx.paths,
        ctx.host,
        &ctx.vars,
        ctx.env_target.as_ref(),
    );
    let report = crate::verify::run(&checks);
    (ctx.registry.report(), report)
}
