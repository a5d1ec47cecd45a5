//! The individual phases.

use std::path::Path;

use tracing::{info, warn};
use walkdir::WalkDir;

use super::{InstallContext, Orchestrator, PhaseOutcome, RunSummary};
use crate::archive::{
    ExclusionRule, ExtractOptions, extract, is_extracted, make_executable, presence_checklist,
    require_subtrees, set_executable_permissions,
};
use crate::cache::{CacheStatus, CacheStore};
use crate::checks::{
    EXTENSION_MARKER, cache_marker, runtime_complete, runtime_home, runtime_probe,
};
use crate::classify::{ExecutionMode, classify};
use crate::download::Fetcher;
use crate::environment::{ApplyResult, ManagedEnvironment, apply};
use crate::errors::ProvisionError;
use crate::plan::CacheSource;
use crate::prereq::{check_disk_space, check_tools};
use crate::settings::{ManagedSettings, merge_config};
use crate::verify::run;

/// Entry prefix holding the payload of an extension package.
const EXTENSION_PAYLOAD: &str = "extension/";

impl<F: Fetcher> Orchestrator<'_, F> {
    pub(super) fn prereq(&self, ctx: &InstallContext) -> Result<PhaseOutcome, ProvisionError> {
        check_tools(&ctx.plan.install.required_tools)?;

        if Self::nothing_pending(ctx, &CacheStore::new(self.fetcher, &ctx.paths.downloads)) {
            return Ok(PhaseOutcome::Skipped(
                "tools present, nothing to download or extract".to_string(),
            ));
        }

        check_disk_space(
            self.disk,
            &ctx.paths.root,
            ctx.plan.install.min_free_bytes,
        )?;
        Ok(PhaseOutcome::Completed)
    }

    /// Returns whether every artifact is cached and the primary archive is
    /// fully extracted.
    fn nothing_pending(ctx: &InstallContext, store: &CacheStore<'_, F>) -> bool {
        let artifacts = ctx.plan.artifacts_for(ctx.host);
        if !artifacts.iter().all(|artifact| store.is_valid(artifact)) {
            return false;
        }
        let Some(primary) = ctx.plan.artifact(&ctx.plan.primary.artifact) else {
            return false;
        };
        let runtime_cached = ctx
            .plan
            .secondary_runtime_for(ctx.host)
            .and_then(|runtime| ctx.plan.artifact(&runtime.artifact))
            .is_some_and(|artifact| store.is_valid(artifact));
        let options = ExtractOptions::new().exclude(primary_exclusions(ctx, runtime_cached));
        is_extracted(&store.path_of(primary), &ctx.paths.install, &options).unwrap_or(false)
    }

    pub(super) async fn acquire(
        &self,
        ctx: &mut InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        ctx.paths.ensure_directories()?;

        let store = CacheStore::new(self.fetcher, &ctx.paths.downloads)
            .with_progress(self.download_progress.clone());
        let mut acquired = Vec::new();
        let mut degraded = false;

        for artifact in ctx.plan.artifacts_for(ctx.host) {
            match store.ensure_cached(artifact).await {
                Ok(outcome) => {
                    info!(artifact = %outcome.name, status = %outcome.status, "artifact ready");
                    acquired.push((artifact.name.clone(), outcome.path.clone()));
                    summary.downloads.push(outcome);
                }
                Err(e) if artifact.optional => {
                    warn!(artifact = %artifact.name, "optional artifact unavailable: {e}");
                    degraded = true;
                }
                Err(e) => return Err(e),
            }
        }
        ctx.acquired.extend(acquired);

        let redownloaded: Vec<&str> = summary
            .downloads
            .iter()
            .filter(|o| o.status == CacheStatus::Redownloaded)
            .map(|o| o.name.as_str())
            .collect();
        Ok(if !redownloaded.is_empty() {
            PhaseOutcome::Remediated(format!("redownloaded {}", redownloaded.join(", ")))
        } else if !degraded
            && summary
                .downloads
                .iter()
                .all(|o| o.status == CacheStatus::Reused)
        {
            PhaseOutcome::Skipped(format!("{} artifacts cached", summary.downloads.len()))
        } else {
            PhaseOutcome::Completed
        })
    }

    pub(super) fn extract_primary(
        &self,
        ctx: &InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        let primary = &ctx.plan.primary;
        let archive = ctx.acquired(&primary.artifact).ok_or_else(|| {
            ProvisionError::missing_artifact(&primary.artifact, ctx.paths.downloads.clone())
        })?;
        let install = ctx.paths.install.as_path();

        let runtime_acquired = ctx
            .plan
            .secondary_runtime_for(ctx.host)
            .is_some_and(|runtime| ctx.acquired(&runtime.artifact).is_some());
        let options = ExtractOptions::new()
            .exclude(primary_exclusions(ctx, runtime_acquired))
            .with_progress(self.extract_progress.clone());

        let outcome = if is_extracted(archive, install, &options)? {
            PhaseOutcome::Skipped(format!("{} already extracted", install.display()))
        } else {
            info!(archive = %archive.display(), dest = %install.display(), "extracting");
            let report = extract(archive, install, &options)?;
            summary.extractions.push((primary.artifact.clone(), report));
            PhaseOutcome::Completed
        };

        let checklist = presence_checklist(install, &primary.subtrees);
        summary.checklist.clone_from(&checklist);
        require_subtrees(install, &checklist)?;
        Ok(outcome)
    }

    pub(super) fn install_secondary_runtime(
        &self,
        ctx: &mut InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        let Some(runtime) = ctx.plan.secondary_runtime_for(ctx.host) else {
            return Ok(PhaseOutcome::Skipped(format!(
                "no secondary runtime for {}",
                ctx.host.arch
            )));
        };
        let home = runtime_home(&ctx.paths, runtime);
        let probe = runtime_probe(&ctx.paths, runtime, ctx.host);

        let Some(archive) = ctx.acquired(&runtime.artifact).map(Path::to_path_buf) else {
            warn!(runtime = %runtime.name, "runtime artifact unavailable, keeping bundled runtime");
            let name = runtime.name.clone();
            ctx.registry.record(name, home, ExecutionMode::Unknown, false);
            return Ok(PhaseOutcome::Skipped("runtime artifact unavailable".to_string()));
        };

        if runtime_complete(&ctx.paths, runtime, Some(archive.as_path()), ctx.host)? {
            let name = runtime.name.clone();
            ctx.registry.record(name, home, ExecutionMode::Native, true);
            return Ok(PhaseOutcome::Skipped(format!("{} is native", probe.display())));
        }

        let remediated = home.exists();
        if remediated {
            info!(dir = %home.display(), "removing incomplete runtime");
            remove_dir(&home)?;
        }

        let options = ExtractOptions::new()
            .strip_common_root(true)
            .with_progress(self.extract_progress.clone());
        let report = extract(&archive, &home, &options)?;
        summary.extractions.push((runtime.name.clone(), report));
        set_executable_permissions(&home)?;

        if !probe.exists() {
            return Err(ProvisionError::missing_artifact(
                runtime.probe.clone(),
                home,
            ));
        }
        let mode = classify(Some(&probe), ctx.host);
        let name = runtime.name.clone();
        ctx.registry.record(name, home.clone(), mode, true);

        Ok(if remediated {
            PhaseOutcome::Remediated(format!("reinstalled {}", home.display()))
        } else {
            PhaseOutcome::Completed
        })
    }

    pub(super) fn warm_caches(
        &self,
        ctx: &InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        if ctx.plan.caches.is_empty() {
            return Ok(PhaseOutcome::Skipped("no caches".to_string()));
        }

        let mut built = 0;
        let mut rebuilt = Vec::new();

        for cache in &ctx.plan.caches {
            let dest = ctx.vars.expand_path(&cache.dest)?;
            let marker = cache_marker(cache, &ctx.vars)?;
            if marker.exists() {
                continue;
            }

            if dest.exists() {
                info!(cache = %cache.name, dir = %dest.display(), "removing incomplete cache");
                remove_dir(&dest)?;
                rebuilt.push(cache.name.as_str());
            }

            match &cache.source {
                CacheSource::Artifact(name) => {
                    let Some(archive) = ctx.acquired(name) else {
                        if cache.optional {
                            warn!(cache = %cache.name, "cache artifact unavailable, skipping");
                            continue;
                        }
                        return Err(ProvisionError::missing_artifact(
                            name.clone(),
                            ctx.paths.downloads.clone(),
                        ));
                    };
                    let options = ExtractOptions::new()
                        .strip_common_root(cache.strip_root)
                        .with_progress(self.extract_progress.clone());
                    let report = extract(archive, &dest, &options)?;
                    summary.extractions.push((cache.name.clone(), report));
                }
                CacheSource::Bundled(subtree) => {
                    let source = ctx.paths.install.join(subtree);
                    if !source.is_dir() {
                        if cache.optional {
                            warn!(cache = %cache.name, source = %source.display(), "bundled cache source missing, skipping");
                            continue;
                        }
                        return Err(ProvisionError::missing_artifact(
                            subtree.clone(),
                            ctx.paths.install.clone(),
                        ));
                    }
                    let copied = copy_tree(&source, &dest)?;
                    info!(cache = %cache.name, files = copied, "copied bundled cache");
                }
            }

            if !marker.exists() {
                if cache.optional {
                    warn!(cache = %cache.name, marker = %marker.display(), "cache marker missing after build");
                    continue;
                }
                return Err(ProvisionError::missing_artifact(cache.marker.clone(), dest));
            }
            built += 1;
        }

        Ok(if !rebuilt.is_empty() {
            PhaseOutcome::Remediated(format!("rebuilt {}", rebuilt.join(", ")))
        } else if built == 0 {
            PhaseOutcome::Skipped("all caches warm".to_string())
        } else {
            PhaseOutcome::Completed
        })
    }

    pub(super) fn post_process(ctx: &mut InstallContext) -> PhaseOutcome {
        if let Err(e) = set_executable_permissions(&ctx.paths.install) {
            warn!("{e}");
        }
        for component in &ctx.plan.components {
            let path = ctx.paths.install.join(&component.path);
            if component.binary
                && path.is_file()
                && let Err(e) = make_executable(&path)
            {
                warn!("{e}");
            }
        }
        record_components(ctx);
        PhaseOutcome::Completed
    }

    pub(super) fn install_extensions(
        &self,
        ctx: &mut InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        if ctx.plan.extensions.is_empty() {
            return Ok(PhaseOutcome::Skipped("no extensions".to_string()));
        }

        let mut installed = 0;
        let mut reinstalled = Vec::new();
        let mut records = Vec::new();

        for extension in &ctx.plan.extensions {
            let dir = ctx.paths.extension_dir(&extension.id);
            let marker = dir.join(EXTENSION_MARKER);
            if marker.is_file() {
                records.push((extension.id.clone(), dir, true));
                continue;
            }

            let Some(archive) = ctx.acquired(&extension.artifact) else {
                warn!(extension = %extension.id, "extension package unavailable");
                records.push((extension.id.clone(), dir, false));
                continue;
            };

            if dir.exists() {
                info!(dir = %dir.display(), "removing incomplete extension");
                remove_dir(&dir)?;
                reinstalled.push(extension.id.as_str());
            }

            let options = ExtractOptions::new()
                .include_prefix(EXTENSION_PAYLOAD)
                .with_progress(self.extract_progress.clone());
            let report = extract(archive, &dir, &options)?;
            summary.extractions.push((extension.id.clone(), report));

            if !marker.is_file() {
                return Err(ProvisionError::missing_artifact(
                    format!("{EXTENSION_PAYLOAD}{EXTENSION_MARKER}"),
                    archive.to_path_buf(),
                ));
            }
            installed += 1;
            records.push((extension.id.clone(), dir, true));
        }

        for (id, dir, present) in records {
            ctx.registry.record(id, dir, ExecutionMode::Unknown, present);
        }

        Ok(if !reinstalled.is_empty() {
            PhaseOutcome::Remediated(format!("reinstalled {}", reinstalled.join(", ")))
        } else if installed == 0 {
            PhaseOutcome::Skipped("all extensions installed".to_string())
        } else {
            PhaseOutcome::Completed
        })
    }

    pub(super) fn merge_config(
        ctx: &InstallContext,
        summary: &mut RunSummary,
    ) -> Result<PhaseOutcome, ProvisionError> {
        let Some(section) = &ctx.plan.settings else {
            return Ok(PhaseOutcome::Skipped("no managed settings".to_string()));
        };
        let managed = ManagedSettings::from_plan(section, &ctx.vars)?;
        let report = merge_config(&managed.path, &managed.values)?;

        let outcome = if report.recovered_from_parse_error {
            PhaseOutcome::Remediated(format!(
                "replaced unparsable {}",
                managed.path.display()
            ))
        } else if report.written {
            PhaseOutcome::Completed
        } else {
            PhaseOutcome::Skipped(format!("{} up to date", managed.path.display()))
        };
        summary.settings = Some(report);
        Ok(outcome)
    }

    pub(super) fn apply_environment(ctx: &InstallContext) -> Result<PhaseOutcome, ProvisionError> {
        let env = ManagedEnvironment::from_plan(&ctx.plan.environment, &ctx.vars)?;
        if env.is_empty() {
            return Ok(PhaseOutcome::Skipped("no managed environment".to_string()));
        }
        let Some(target) = &ctx.env_target else {
            warn!("no shell profile detected; managed environment not applied");
            return Ok(PhaseOutcome::Skipped("no shell profile detected".to_string()));
        };

        Ok(match apply(target, &env)? {
            ApplyResult::Unchanged => PhaseOutcome::Skipped(format!("{target} up to date")),
            ApplyResult::Added | ApplyResult::Updated => {
                info!(profile = %target, "managed environment written");
                PhaseOutcome::Completed
            }
        })
    }

    pub(super) fn verify(ctx: &InstallContext, summary: &mut RunSummary) -> PhaseOutcome {
        let checks = crate::checks::standard_checks(
            &ctx.plan,
            &ctx.paths,
            ctx.host,
            &ctx.vars,
            ctx.env_target.as_ref(),
        );
        summary.verification = run(&checks);
        info!(
            passed = summary.verification.passed(),
            total = summary.verification.total(),
            "verification finished"
        );
        PhaseOutcome::Completed
    }
}

/// Exclusions for the primary archive. The replaced subtree is excluded only
/// when the secondary runtime can be installed in its place.
fn primary_exclusions(ctx: &InstallContext, runtime_available: bool) -> ExclusionRule {
    let exclusions = ExclusionRule::new(&ctx.plan.primary.exclude);
    match ctx.plan.secondary_runtime_for(ctx.host) {
        Some(runtime) if runtime_available => exclusions.with_prefix(&runtime.replaces),
        _ => exclusions,
    }
}

/// Records every declared component with its current classification.
fn record_components(ctx: &mut InstallContext) {
    for component in &ctx.plan.components {
        let path = ctx.paths.install.join(&component.path);
        let present = path.exists();
        let mode = if present {
            classify(component.binary.then_some(path.as_path()), ctx.host)
        } else {
            ExecutionMode::Unknown
        };
        ctx.registry.record(component.name.clone(), path, mode, present);
    }
}

/// Rebuilds the registry from disk in the order an install run records it.
pub(super) fn record_installed(ctx: &mut InstallContext) {
    if let Some(runtime) = ctx.plan.secondary_runtime_for(ctx.host) {
        let home = runtime_home(&ctx.paths, runtime);
        let probe = runtime_probe(&ctx.paths, runtime, ctx.host);
        let present = probe.exists();
        let mode = classify(Some(&probe), ctx.host);
        let name = runtime.name.clone();
        ctx.registry.record(name, home, mode, present);
    }
    record_components(ctx);
    let extensions: Vec<_> = ctx
        .plan
        .extensions
        .iter()
        .map(|extension| {
            let dir = ctx.paths.extension_dir(&extension.id);
            let present = dir.join(EXTENSION_MARKER).is_file();
            (extension.id.clone(), dir, present)
        })
        .collect();
    for (id, dir, present) in extensions {
        ctx.registry.record(id, dir, ExecutionMode::Unknown, present);
    }
}

fn remove_dir(dir: &Path) -> Result<(), ProvisionError> {
    std::fs::remove_dir_all(dir)
        .map_err(|e| ProvisionError::io_error(format!("failed to remove {}", dir.display()), e))
}

/// Copies the contents of `source` into `dest`, returning the file count.
fn copy_tree(source: &Path, dest: &Path) -> Result<usize, ProvisionError> {
    let mut files = 0;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            ProvisionError::io_error(format!("failed to walk {}", source.display()), e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| {
                ProvisionError::io_error(format!("failed to create {}", target.display()), e)
            })?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                ProvisionError::io_error(format!("failed to copy to {}", target.display()), e)
            })?;
            files += 1;
        }
    }
    Ok(files)
}
