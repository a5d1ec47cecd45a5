//! Install plan: the declarative description of one toolchain installation.
//!
//! A plan is a TOML document. It names every artifact to download, how the
//! primary archive is extracted, which optional secondary runtime replaces a
//! bundled subtree on a given architecture, which caches are warmed, which
//! editor extensions are installed, and which settings and environment
//! variables are managed.
//!
//! ## Example
//!
//! ```toml
//! [install]
//! name = "studio"
//! required_tools = ["git"]
//! min_free_bytes = 4294967296
//!
//! [[artifacts]]
//! name = "bundle"
//! url = "https://dl.example.com/studio-2024.2.zip"
//! expected_min_bytes = 1000000000
//!
//! [primary]
//! artifact = "bundle"
//! exclude = ["plugins/android-ndk/"]
//! subtrees = [{ path = "bin" }, { path = "plugins", required = false }]
//!
//! [settings]
//! path = "~/.config/Code/User/settings.json"
//! values = { "java.jdt.ls.java.home" = "${component.runtime}" }
//! ```
//!
//! String values in `caches.dest`, `settings.path`, `settings.values`,
//! `environment.vars` and `environment.path_entries` may reference
//! `${name}` placeholders, resolved by [`Variables`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component as PathComponent, Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProvisionError;
use crate::paths::{InstallPaths, expand_home};
use crate::platform::{Arch, Host};

/// Top-level install plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallPlan {
    #[serde(default)]
    pub install: InstallSection,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub primary: PrimarySection,
    pub secondary_runtime: Option<SecondaryRuntime>,
    #[serde(default)]
    pub caches: Vec<CacheSpec>,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub extensions: Vec<ExtensionSpec>,
    pub settings: Option<SettingsSection>,
    #[serde(default)]
    pub environment: EnvironmentSection,
}

/// General installation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallSection {
    #[serde(default = "default_install_name")]
    pub name: String,
    /// Tools that must resolve on `PATH` before anything is mutated.
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Free bytes required on the root volume when something must be
    /// downloaded or extracted.
    #[serde(default)]
    pub min_free_bytes: u64,
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            name: default_install_name(),
            required_tools: Vec::new(),
            min_free_bytes: 0,
        }
    }
}

fn default_install_name() -> String {
    "toolchain".to_string()
}

/// A downloadable file.
///
/// `expected_min_bytes` is an integrity heuristic: a cached file at least
/// this large is trusted without re-download. `sha256`, when present, is
/// checked only right after a fresh download.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    pub name: String,
    pub url: String,
    /// File name in the downloads directory; defaults to the last URL segment.
    pub file: Option<String>,
    #[serde(default)]
    pub expected_min_bytes: u64,
    pub sha256: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl Artifact {
    /// Returns the file name the artifact is cached under.
    #[must_use]
    pub fn file_name(&self) -> String {
        if let Some(file) = &self.file {
            return file.clone();
        }
        self.url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.name.clone(), str::to_string)
    }

    /// Returns the cache destination inside `downloads`.
    #[must_use]
    pub fn dest(&self, downloads: &Path) -> PathBuf {
        downloads.join(self.file_name())
    }
}

/// Extraction of the primary archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimarySection {
    pub artifact: String,
    /// Case-insensitive entry path prefixes that are never extracted.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Subtrees expected under the install root after extraction.
    #[serde(default)]
    pub subtrees: Vec<Subtree>,
}

/// An expected directory or file under the install root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subtree {
    pub path: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// A runtime that replaces a bundled subtree on one architecture.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecondaryRuntime {
    pub name: String,
    pub artifact: String,
    /// Host architecture this runtime is installed on.
    pub arch: Arch,
    /// Entry prefix of the bundled runtime in the primary archive.
    pub replaces: String,
    /// Installation directory relative to the install root.
    pub install_dir: String,
    /// Executable relative to `install_dir` used to validate the install.
    pub probe: String,
}

impl SecondaryRuntime {
    /// Returns whether this runtime applies to the host.
    #[must_use]
    pub fn applies_to(&self, host: Host) -> bool {
        self.arch == host.arch
    }
}

/// A pre-populated cache directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSpec {
    pub name: String,
    /// Destination directory; may use `~` and placeholders.
    pub dest: String,
    /// Path relative to `dest` whose presence means the cache is warm.
    pub marker: String,
    pub source: CacheSource,
    #[serde(default)]
    pub optional: bool,
    /// Strip a single wrapping folder when extracting from an archive.
    #[serde(default)]
    pub strip_root: bool,
}

/// Where cache contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Extracted from a downloaded archive artifact.
    Artifact(String),
    /// Copied from a subtree of the primary install.
    Bundled(String),
}

/// A component recorded in the registry after post-processing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: String,
    /// Path relative to the install root.
    pub path: String,
    /// Whether `path` is a native binary whose header can be inspected.
    #[serde(default = "default_true")]
    pub binary: bool,
}

/// An editor extension package.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionSpec {
    pub id: String,
    pub artifact: String,
}

/// Managed keys of a user-owned settings document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    pub path: String,
    #[serde(default)]
    pub values: serde_json::Map<String, Value>,
}

/// Managed environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Shell profile to write; detected from `$SHELL` when absent.
    pub profile: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub path_entries: Vec<String>,
}

impl EnvironmentSection {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_entries.is_empty()
    }
}

impl InstallPlan {
    /// Loads and validates a plan file.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::plan_error(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a plan from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` on syntax or validation failures.
    pub fn from_toml_str(content: &str) -> Result<Self, ProvisionError> {
        let plan: Self = toml::from_str(content)
            .map_err(|e| ProvisionError::plan_error(e.message().to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Looks up an artifact by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Returns the secondary runtime if it applies to `host`.
    #[must_use]
    pub fn secondary_runtime_for(&self, host: Host) -> Option<&SecondaryRuntime> {
        self.secondary_runtime
            .as_ref()
            .filter(|runtime| runtime.applies_to(host))
    }

    /// Returns the artifacts needed on `host`, in declared order.
    ///
    /// An artifact referenced only by a secondary runtime for another
    /// architecture is not needed.
    #[must_use]
    pub fn artifacts_for(&self, host: Host) -> Vec<&Artifact> {
        let mut needed = BTreeSet::new();
        needed.insert(self.primary.artifact.as_str());
        if let Some(runtime) = self.secondary_runtime_for(host) {
            needed.insert(runtime.artifact.as_str());
        }
        for cache in &self.caches {
            if let CacheSource::Artifact(name) = &cache.source {
                needed.insert(name.as_str());
            }
        }
        for extension in &self.extensions {
            needed.insert(extension.artifact.as_str());
        }
        self.artifacts
            .iter()
            .filter(|a| needed.contains(a.name.as_str()))
            .collect()
    }

    /// Appends exclusion prefixes given at invocation time.
    pub fn add_exclusions<I, S>(&mut self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prefix in prefixes {
            let prefix = prefix.into();
            if !self
                .primary
                .exclude
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&prefix))
            {
                self.primary.exclude.push(prefix);
            }
        }
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        let mut names = BTreeSet::new();
        for artifact in &self.artifacts {
            if !names.insert(artifact.name.as_str()) {
                return Err(ProvisionError::plan_error(format!(
                    "duplicate artifact `{}`",
                    artifact.name
                )));
            }
            if let Some(sha) = &artifact.sha256
                && (sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()))
            {
                return Err(ProvisionError::plan_error(format!(
                    "artifact `{}` has a malformed sha256",
                    artifact.name
                )));
            }
        }

        let primary = self.require_artifact(&self.primary.artifact, "primary")?;
        if primary.optional {
            return Err(ProvisionError::plan_error(format!(
                "primary artifact `{}` cannot be optional",
                primary.name
            )));
        }
        for subtree in &self.primary.subtrees {
            require_relative(&subtree.path, "primary subtree")?;
        }

        if let Some(runtime) = &self.secondary_runtime {
            self.require_artifact(&runtime.artifact, &runtime.name)?;
            require_relative(&runtime.install_dir, &runtime.name)?;
            require_relative(&runtime.probe, &runtime.name)?;
        }

        for cache in &self.caches {
            require_relative(&cache.marker, &cache.name)?;
            match &cache.source {
                CacheSource::Artifact(name) => {
                    self.require_artifact(name, &cache.name)?;
                }
                CacheSource::Bundled(path) => require_relative(path, &cache.name)?,
            }
        }

        let mut component_names = BTreeSet::new();
        for component in &self.components {
            require_relative(&component.path, &component.name)?;
            if !component_names.insert(component.name.as_str()) {
                return Err(ProvisionError::plan_error(format!(
                    "duplicate component `{}`",
                    component.name
                )));
            }
        }

        for extension in &self.extensions {
            self.require_artifact(&extension.artifact, &extension.id)?;
            require_relative(&extension.id, &extension.id)?;
        }

        Ok(())
    }

    fn require_artifact(&self, name: &str, user: &str) -> Result<&Artifact, ProvisionError> {
        self.artifact(name).ok_or_else(|| {
            ProvisionError::plan_error(format!("`{user}` references unknown artifact `{name}`"))
        })
    }
}

/// Rejects absolute paths and parent references in plan-relative paths.
fn require_relative(path: &str, user: &str) -> Result<(), ProvisionError> {
    let p = Path::new(path);
    if path.is_empty()
        || p.is_absolute()
        || p.components().any(|c| {
            matches!(
                c,
                PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_)
            )
        })
    {
        return Err(ProvisionError::plan_error(format!(
            "`{user}` uses path `{path}`, which must be relative and stay inside its root"
        )));
    }
    Ok(())
}

/// Placeholder values available to plan templates.
///
/// Every value is derived from the plan and the paths alone, so the same
/// expansion is reproduced by a later `verify` run without any recorded
/// state.
///
/// | Placeholder             | Value                                       |
/// |-------------------------|---------------------------------------------|
/// | `root`                  | rigup root directory                        |
/// | `install_root`          | primary install directory                   |
/// | `downloads`             | download cache                              |
/// | `extensions`            | extension directory                         |
/// | `home`                  | user home directory                         |
/// | `component.<name>`      | installed path of a component, runtime or extension |
/// | `cache.<name>`          | expanded destination of a cache             |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    /// Derives the placeholder table for `plan` installed at `paths`.
    #[must_use]
    pub fn derive(plan: &InstallPlan, paths: &InstallPaths) -> Self {
        let mut values = BTreeMap::new();
        let display = |p: &Path| p.display().to_string();

        values.insert("root".to_string(), display(&paths.root));
        values.insert("install_root".to_string(), display(&paths.install));
        values.insert("downloads".to_string(), display(&paths.downloads));
        values.insert("extensions".to_string(), display(&paths.extensions));
        if let Some(home) = dirs::home_dir() {
            values.insert("home".to_string(), display(&home));
        }

        for component in &plan.components {
            values.insert(
                format!("component.{}", component.name),
                display(&paths.install.join(&component.path)),
            );
        }
        if let Some(runtime) = &plan.secondary_runtime {
            values.insert(
                format!("component.{}", runtime.name),
                display(&paths.install.join(&runtime.install_dir)),
            );
        }
        for extension in &plan.extensions {
            values.insert(
                format!("component.{}", extension.id),
                display(&paths.extension_dir(&extension.id)),
            );
        }

        let mut vars = Self { values };
        for cache in &plan.caches {
            if let Ok(dest) = vars.expand_path(&cache.dest) {
                vars.set(format!("cache.{}", cache.name), display(&dest));
            }
        }
        vars
    }

    /// Returns the value of one placeholder.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Overrides or adds one placeholder.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Replaces every `${name}` in `template`.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` for an unknown placeholder or an unterminated `${`.
    pub fn expand(&self, template: &str) -> Result<String, ProvisionError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(ProvisionError::plan_error(format!(
                    "unterminated placeholder in `{template}`"
                )));
            };
            let name = &after[..end];
            let value = self.get(name).ok_or_else(|| {
                ProvisionError::plan_error(format!("unknown placeholder `${{{name}}}`"))
            })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Expands placeholders, then a leading `~`.
    ///
    /// # Errors
    ///
    /// Same as [`Variables::expand`].
    pub fn expand_path(&self, template: &str) -> Result<PathBuf, ProvisionError> {
        Ok(expand_home(&self.expand(template)?))
    }

    /// Expands placeholders in every string inside a JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`Variables::expand`].
    pub fn expand_value(&self, value: &Value) -> Result<Value, ProvisionError> {
        Ok(match value {
            Value::String(s) => Value::String(self.expand(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.expand_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.expand_value(v)?)))
                    .collect::<Result<_, ProvisionError>>()?,
            ),
            other => other.clone(),
        })
    }
}
