//! The standard verification catalog for an install plan.
//!
//! Every predicate reads the filesystem or environment at evaluation time.
//! Nothing is carried over from the install run, so `rigup verify` on its
//! own gives the same answers as the verify phase of `rigup install`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::{ExclusionRule, ExtractOptions, is_extracted};
use crate::classify::{ExecutionMode, classify};
use crate::environment::{EnvTarget, ManagedEnvironment, is_path_entry_applied, is_var_applied};
use crate::errors::ProvisionError;
use crate::paths::InstallPaths;
use crate::plan::{CacheSpec, InstallPlan, SecondaryRuntime, Variables};
use crate::platform::Host;
use crate::settings::{ConfigDocument, ManagedSettings};
use crate::verify::Check;

/// Marker file proving an extension package was extracted.
pub const EXTENSION_MARKER: &str = "package.json";

/// Returns the probe executable of a secondary runtime.
///
/// On Windows a probe declared without an extension gets `.exe` appended.
#[must_use]
pub fn runtime_probe(paths: &InstallPaths, runtime: &SecondaryRuntime, host: Host) -> PathBuf {
    let probe = runtime_home(paths, runtime).join(&runtime.probe);
    if probe.extension().is_none() && !host.executable_extension().is_empty() {
        let mut name = probe.file_name().unwrap_or_default().to_os_string();
        name.push(host.executable_extension());
        return probe.with_file_name(name);
    }
    probe
}

/// Returns where a secondary runtime is installed.
#[must_use]
pub fn runtime_home(paths: &InstallPaths, runtime: &SecondaryRuntime) -> PathBuf {
    paths.install.join(&runtime.install_dir)
}

/// Returns whether a secondary runtime is fully installed.
///
/// The probe must be native to `host`. When `archive` is given, every entry
/// of it must also be on disk under the runtime home, so a runtime whose
/// extraction stopped after the probe was written is not complete.
///
/// # Errors
///
/// Returns `ExtractionError` if `archive` cannot be read.
pub fn runtime_complete(
    paths: &InstallPaths,
    runtime: &SecondaryRuntime,
    archive: Option<&Path>,
    host: Host,
) -> Result<bool, ProvisionError> {
    if classify(Some(&runtime_probe(paths, runtime, host)), host) != ExecutionMode::Native {
        return Ok(false);
    }
    match archive {
        Some(archive) => is_extracted(
            archive,
            &runtime_home(paths, runtime),
            &ExtractOptions::new().strip_common_root(true),
        ),
        None => Ok(true),
    }
}

/// Returns the marker path of a cache.
///
/// # Errors
///
/// Returns `PlanError` if `dest` uses an unknown placeholder.
pub fn cache_marker(cache: &CacheSpec, vars: &Variables) -> Result<PathBuf, ProvisionError> {
    Ok(vars.expand_path(&cache.dest)?.join(&cache.marker))
}

/// Returns the first path under `install` matched by an exclusion prefix.
///
/// Matching is case-insensitive and, like extraction, not tied to directory
/// boundaries: `plugins/ndk` also matches `plugins/ndk-bundle/`.
fn first_excluded(install: &Path, prefix: &str) -> Option<PathBuf> {
    let rule = ExclusionRule::new([prefix]);
    let wanted = rule.prefixes().first()?.clone();
    let name_of = |entry: &walkdir::DirEntry| {
        let relative = entry.path().strip_prefix(install).unwrap_or(entry.path());
        let mut name = relative.to_string_lossy().replace('\\', "/").to_lowercase();
        if entry.file_type().is_dir() {
            name.push('/');
        }
        name
    };

    WalkDir::new(install)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let name = name_of(entry);
            wanted.starts_with(&name) || rule.matches(&name)
        })
        .filter_map(Result::ok)
        .find(|entry| rule.matches(&name_of(entry)))
        .map(walkdir::DirEntry::into_path)
}

fn present(path: &Path) -> String {
    format!("{} present", path.display())
}

fn missing(path: &Path) -> String {
    format!("{} missing", path.display())
}

/// Builds the standard catalog.
///
/// `env_target` is `None` when no shell profile could be resolved; managed
/// variables then fail their checks rather than being skipped.
#[must_use]
pub fn standard_checks<'a>(
    plan: &'a InstallPlan,
    paths: &'a InstallPaths,
    host: Host,
    vars: &'a Variables,
    env_target: Option<&'a EnvTarget>,
) -> Vec<Check<'a>> {
    let mut checks = Vec::new();
    let install = paths.install.as_path();

    checks.push(Check::new(
        "install root",
        move || Ok(install.is_dir()),
        move |ok| if ok { present(install) } else { missing(install) },
    ));

    for subtree in &plan.primary.subtrees {
        let path = install.join(subtree.path.trim_end_matches('/'));
        let required = subtree.required;
        checks.push(Check::new(
            format!("subtree {}", subtree.path),
            {
                let path = path.clone();
                move || Ok(!required || path.exists())
            },
            move |_| match (path.exists(), required) {
                (true, _) => present(&path),
                (false, true) => missing(&path),
                (false, false) => format!("{} absent (optional)", path.display()),
            },
        ));
    }

    let runtime = plan.secondary_runtime_for(host);
    for prefix in &plan.primary.exclude {
        let trimmed = prefix.trim_end_matches('/');
        let replaced_by = runtime.filter(|r| {
            r.install_dir
                .trim_end_matches('/')
                .eq_ignore_ascii_case(trimmed)
        });
        checks.push(Check::new(
            format!("excluded {prefix}"),
            move || Ok(replaced_by.is_some() || first_excluded(install, prefix).is_none()),
            move |_| match (replaced_by, first_excluded(install, prefix)) {
                (Some(r), _) => format!("replaced by {}", r.name),
                (None, None) => format!("{} absent", install.join(trimmed).display()),
                (None, Some(path)) => format!("{} present but excluded", path.display()),
            },
        ));
    }

    for component in &plan.components {
        let path = install.join(&component.path);
        let binary = component.binary;
        checks.push(Check::new(
            format!("component {}", component.name),
            {
                let path = path.clone();
                move || Ok(path.exists())
            },
            move |ok| {
                if !ok {
                    return missing(&path);
                }
                let mode = classify(binary.then_some(path.as_path()), host);
                format!("{} ({mode})", path.display())
            },
        ));
    }

    if let Some(runtime) = runtime {
        let probe = runtime_probe(paths, runtime, host);
        let archive = plan
            .artifact(&runtime.artifact)
            .map(|artifact| artifact.dest(&paths.downloads));
        checks.push(Check::new(
            format!("runtime {}", runtime.name),
            move || {
                let cached = archive.as_deref().filter(|archive| archive.is_file());
                Ok(runtime_complete(paths, runtime, cached, host)?)
            },
            move |ok| {
                if !probe.exists() {
                    return missing(&probe);
                }
                let mode = classify(Some(&probe), host);
                if ok || mode != ExecutionMode::Native {
                    format!("{} ({mode})", probe.display())
                } else {
                    format!("{} incomplete", runtime_home(paths, runtime).display())
                }
            },
        ));
    }

    for cache in &plan.caches {
        let optional = cache.optional;
        checks.push(Check::new(
            format!("cache {}", cache.name),
            move || Ok(optional || cache_marker(cache, vars)?.exists()),
            move |_| match cache_marker(cache, vars) {
                Ok(marker) if marker.exists() => present(&marker),
                Ok(marker) if optional => format!("{} absent (optional)", marker.display()),
                Ok(marker) => missing(&marker),
                Err(e) => e.to_string(),
            },
        ));
    }

    for extension in &plan.extensions {
        let marker = paths.extension_dir(&extension.id).join(EXTENSION_MARKER);
        checks.push(Check::new(
            format!("extension {}", extension.id),
            {
                let marker = marker.clone();
                move || Ok(marker.is_file())
            },
            move |ok| if ok { present(&marker) } else { missing(&marker) },
        ));
    }

    if let Some(section) = &plan.settings {
        for key in section.values.keys() {
            checks.push(Check::new(
                format!("setting {key}"),
                move || {
                    let managed = ManagedSettings::from_plan(section, vars)?;
                    let document = ConfigDocument::load(&managed.path)?;
                    Ok(document.get(key) == managed.values.get(key))
                },
                move |ok| {
                    let path = vars
                        .expand_path(&section.path)
                        .map_or_else(|_| section.path.clone(), |p| p.display().to_string());
                    if ok {
                        format!("{path}: `{key}` up to date")
                    } else {
                        format!("{path}: `{key}` differs from the managed value")
                    }
                },
            ));
        }
    }

    let environment = &plan.environment;
    for name in environment.vars.keys() {
        checks.push(Check::new(
            format!("env {name}"),
            move || {
                let Some(target) = env_target else {
                    return Ok(false);
                };
                let managed = ManagedEnvironment::from_plan(environment, vars)?;
                let value = managed.vars.get(name).map_or("", String::as_str);
                Ok(is_var_applied(target, name, value)?)
            },
            move |ok| match env_target {
                None => "no shell profile detected".to_string(),
                Some(target) if ok => format!("set in {target}"),
                Some(target) => format!("not set in {target}"),
            },
        ));
    }
    for (index, entry) in environment.path_entries.iter().enumerate() {
        checks.push(Check::new(
            format!("PATH entry {entry}"),
            move || {
                let Some(target) = env_target else {
                    return Ok(false);
                };
                let managed = ManagedEnvironment::from_plan(environment, vars)?;
                Ok(is_path_entry_applied(target, &managed.path_entries[index])?)
            },
            move |ok| match env_target {
                None => "no shell profile detected".to_string(),
                Some(target) if ok => format!("on PATH in {target}"),
                Some(target) => format!("missing from PATH in {target}"),
            },
        ));
    }

    for tool in &plan.install.required_tools {
        checks.push(Check::new(
            format!("tool {tool}"),
            move || Ok(which::which(tool).is_ok()),
            move |_| match which::which(tool) {
                Ok(path) => format!("{}", path.display()),
                Err(_) => format!("`{tool}` not found on PATH"),
            },
        ));
    }

    checks
}
