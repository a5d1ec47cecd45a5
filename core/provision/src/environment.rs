//! Managed environment variables.
//!
//! On Unix the variables are written to the user's shell profile as one
//! marker-delimited block. The block is replaced wholesale on every run, so
//! applying the same environment twice leaves the profile byte-identical and
//! changing a value never leaves a stale line behind:
//!
//! ```bash
//! # >>> rigup managed environment >>>
//! export STUDIO_HOME="/home/user/.rigup/toolchain"
//! export PATH="/home/user/.rigup/toolchain/bin:$PATH"
//! # <<< rigup managed environment <<<
//! ```
//!
//! Fish profiles get `set -gx` and `fish_add_path` lines instead. On Windows
//! the variables go to `HKEY_CURRENT_USER\Environment`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::ProvisionError;
use crate::plan::{EnvironmentSection, Variables};

/// First line of the managed block.
pub const BLOCK_START: &str = "# >>> rigup managed environment >>>";

/// Last line of the managed block.
pub const BLOCK_END: &str = "# <<< rigup managed environment <<<";

/// Represents supported shell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    /// Detects the user's shell from the SHELL environment variable.
    ///
    /// Returns `None` if the shell cannot be determined or is not supported.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let shell_path = std::env::var("SHELL").ok()?;
        Self::from_path(&shell_path)
    }

    /// Parses a shell from a path string (e.g., "/bin/bash").
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let shell_name = Path::new(path).file_name()?.to_str()?;
        match shell_name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    /// Guesses the shell syntax of an explicitly configured profile file.
    #[must_use]
    pub fn for_profile(profile: &Path) -> Self {
        let name = profile
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".fish") {
            Self::Fish
        } else if name.starts_with(".zsh") {
            Self::Zsh
        } else {
            Self::Bash
        }
    }

    /// Returns the profile files to check for this shell.
    #[must_use]
    pub fn profile_candidates(self, home_dir: &Path) -> Vec<PathBuf> {
        match self {
            Self::Bash => vec![home_dir.join(".bashrc"), home_dir.join(".bash_profile")],
            Self::Zsh => vec![home_dir.join(".zshrc")],
            Self::Fish => vec![home_dir.join(".config").join("fish").join("config.fish")],
        }
    }

    /// Renders one variable assignment.
    #[must_use]
    pub fn var_line(self, name: &str, value: &str) -> String {
        match self {
            Self::Bash | Self::Zsh => format!("export {name}=\"{}\"", escape_double_quoted(value)),
            Self::Fish => format!("set -gx {name} {}", quote_fish(value)),
        }
    }

    /// Renders one PATH prepend.
    #[must_use]
    pub fn path_line(self, entry: &str) -> String {
        match self {
            Self::Bash | Self::Zsh => {
                format!("export PATH=\"{}:$PATH\"", escape_double_quoted(entry))
            }
            Self::Fish => format!("fish_add_path {}", quote_fish(entry)),
        }
    }

    /// Renders the complete managed block, markers included.
    #[must_use]
    pub fn render_block(self, env: &ManagedEnvironment) -> String {
        let mut block = String::new();
        block.push_str(BLOCK_START);
        block.push('\n');
        for (name, value) in &env.vars {
            block.push_str(&self.var_line(name, value));
            block.push('\n');
        }
        for entry in &env.path_entries {
            block.push_str(&self.path_line(entry));
            block.push('\n');
        }
        block.push_str(BLOCK_END);
        block.push('\n');
        block
    }
}

/// Escapes `\`, `$`, backticks and `"` for use inside double quotes.
fn escape_double_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('$', "\\$")
        .replace('`', "\\`")
        .replace('"', "\\\"")
}

/// Single-quotes a fish word when it contains special characters.
fn quote_fish(value: &str) -> String {
    const SPECIAL: &[char] = &[
        ' ', '$', '\\', '\'', '*', '?', '(', ')', '[', ']', '{', '}',
    ];
    if value.is_empty() || value.contains(SPECIAL) {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

/// Variables and PATH entries with every placeholder already expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedEnvironment {
    pub vars: BTreeMap<String, String>,
    pub path_entries: Vec<String>,
}

impl ManagedEnvironment {
    /// Expands the placeholders of a plan's environment section.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` for an unknown placeholder.
    pub fn from_plan(
        section: &EnvironmentSection,
        vars: &Variables,
    ) -> Result<Self, ProvisionError> {
        let vars_expanded = section
            .vars
            .iter()
            .map(|(name, value)| Ok((name.clone(), vars.expand(value)?)))
            .collect::<Result<BTreeMap<_, _>, ProvisionError>>()?;
        let path_entries = section
            .path_entries
            .iter()
            .map(|entry| vars.expand(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            vars: vars_expanded,
            path_entries,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_entries.is_empty()
    }
}

/// Where managed variables are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvTarget {
    /// A shell profile file, written in the given shell's syntax.
    Profile { path: PathBuf, shell: Shell },
    /// `HKEY_CURRENT_USER\Environment`.
    #[cfg(windows)]
    Registry,
}

impl EnvTarget {
    /// Resolves the target: an explicit profile wins, then the registry on
    /// Windows, then the detected shell's profile on Unix.
    ///
    /// Returns `None` when no shell can be detected.
    #[must_use]
    pub fn resolve(profile_override: Option<&Path>) -> Option<Self> {
        if let Some(path) = profile_override {
            return Some(Self::Profile {
                path: path.to_path_buf(),
                shell: Shell::for_profile(path),
            });
        }
        Self::detect()
    }

    #[cfg(windows)]
    fn detect() -> Option<Self> {
        Some(Self::Registry)
    }

    #[cfg(unix)]
    fn detect() -> Option<Self> {
        let shell = Shell::detect()?;
        let home_dir = dirs::home_dir()?;
        let candidates = shell.profile_candidates(&home_dir);
        let path = candidates
            .iter()
            .find(|p| p.exists())
            .or_else(|| candidates.first())?
            .clone();
        Some(Self::Profile { path, shell })
    }
}

impl fmt::Display for EnvTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile { path, .. } => write!(f, "{}", path.display()),
            #[cfg(windows)]
            Self::Registry => f.write_str(r"Registry: HKCU\Environment"),
        }
    }
}

/// Result of applying the managed environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// No managed block existed; one was appended.
    Added,
    /// An existing managed block was replaced with different content.
    Updated,
    /// The target already held exactly this environment.
    Unchanged,
}

/// Writes `env` to `target`.
///
/// # Errors
///
/// Returns `IoError` when the profile cannot be read or written and
/// `EnvironmentError` when the registry cannot be updated.
pub fn apply(target: &EnvTarget, env: &ManagedEnvironment) -> Result<ApplyResult, ProvisionError> {
    match target {
        EnvTarget::Profile { path, shell } => apply_to_profile(path, *shell, env),
        #[cfg(windows)]
        EnvTarget::Registry => registry::apply(env),
    }
}

/// Returns whether `name=value` is currently applied on `target`.
///
/// # Errors
///
/// Returns `IoError` when the profile exists but cannot be read.
pub fn is_var_applied(target: &EnvTarget, name: &str, value: &str) -> Result<bool, ProvisionError> {
    match target {
        EnvTarget::Profile { path, shell } => {
            let line = shell.var_line(name, value);
            Ok(read_block(path)?.is_some_and(|block| block.lines().any(|l| l == line)))
        }
        #[cfg(windows)]
        EnvTarget::Registry => Ok(registry::get(name)?.is_some_and(|v| v == value)),
    }
}

/// Returns whether `entry` is on the managed PATH of `target`.
///
/// # Errors
///
/// Returns `IoError` when the profile exists but cannot be read.
pub fn is_path_entry_applied(target: &EnvTarget, entry: &str) -> Result<bool, ProvisionError> {
    match target {
        EnvTarget::Profile { path, shell } => {
            let line = shell.path_line(entry);
            Ok(read_block(path)?.is_some_and(|block| block.lines().any(|l| l == line)))
        }
        #[cfg(windows)]
        EnvTarget::Registry => Ok(registry::get("Path")?
            .is_some_and(|p| p.split(';').any(|e| e.eq_ignore_ascii_case(entry)))),
    }
}

fn apply_to_profile(
    path: &Path,
    shell: Shell,
    env: &ManagedEnvironment,
) -> Result<ApplyResult, ProvisionError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(ProvisionError::io_error(
                format!("failed to read profile: {}", path.display()),
                e,
            ));
        }
    };

    let block = shell.render_block(env);
    let (updated, result) = match find_block(&content) {
        Some((start, end)) if content[start..end] == block => return Ok(ApplyResult::Unchanged),
        Some((start, end)) => {
            let mut updated = String::with_capacity(content.len() + block.len());
            updated.push_str(&content[..start]);
            updated.push_str(&block);
            updated.push_str(&content[end..]);
            (updated, ApplyResult::Updated)
        }
        None => {
            let mut updated = content;
            if !updated.is_empty() {
                if !updated.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push('\n');
            }
            updated.push_str(&block);
            (updated, ApplyResult::Added)
        }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ProvisionError::io_error(format!("failed to create {}", parent.display()), e)
        })?;
    }
    std::fs::write(path, updated).map_err(|e| {
        ProvisionError::io_error(format!("failed to write profile: {}", path.display()), e)
    })?;
    debug!(profile = %path.display(), ?result, "managed environment written");
    Ok(result)
}

/// Returns the byte range of the managed block, including the newline that
/// follows the end marker.
fn find_block(content: &str) -> Option<(usize, usize)> {
    let start = line_start(content, BLOCK_START)?;
    let end_marker = start + content[start..].find(BLOCK_END)?;
    let mut end = end_marker + BLOCK_END.len();
    if content[end..].starts_with('\n') {
        end += 1;
    }
    Some((start, end))
}

/// Finds `marker` at the beginning of a line.
fn line_start(content: &str, marker: &str) -> Option<usize> {
    content
        .match_indices(marker)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || content.as_bytes()[i - 1] == b'\n')
}

fn read_block(path: &Path) -> Result<Option<String>, ProvisionError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ProvisionError::io_error(
                format!("failed to read profile: {}", path.display()),
                e,
            ));
        }
    };
    Ok(find_block(&content).map(|(start, end)| content[start..end].to_string()))
}

#[cfg(windows)]
mod registry {
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

    use super::{ApplyResult, ManagedEnvironment};
    use crate::errors::ProvisionError;

    fn open() -> Result<RegKey, ProvisionError> {
        RegKey::predef(HKEY_CURRENT_USER)
            .open_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
            .map_err(|e| {
                ProvisionError::environment_error(format!(
                    "failed to open HKCU\\Environment registry key: {e}"
                ))
            })
    }

    pub(super) fn get(name: &str) -> Result<Option<String>, ProvisionError> {
        Ok(open()?.get_value::<String, _>(name).ok())
    }

    pub(super) fn apply(env: &ManagedEnvironment) -> Result<ApplyResult, ProvisionError> {
        let key = open()?;
        let mut changed = false;

        for (name, value) in &env.vars {
            let current: Option<String> = key.get_value(name).ok();
            if current.as_deref() != Some(value.as_str()) {
                key.set_value(name, value).map_err(|e| {
                    ProvisionError::environment_error(format!("failed to set {name}: {e}"))
                })?;
                changed = true;
            }
        }

        let current_path: String = key.get_value("Path").unwrap_or_default();
        let mut entries: Vec<String> = current_path
            .split(';')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let mut path_changed = false;
        for entry in &env.path_entries {
            if !entries.iter().any(|p| p.eq_ignore_ascii_case(entry)) {
                entries.push(entry.clone());
                path_changed = true;
            }
        }
        if path_changed {
            key.set_value("Path", &entries.join(";")).map_err(|e| {
                ProvisionError::environment_error(format!("failed to update PATH: {e}"))
            })?;
            changed = true;
        }

        Ok(if changed {
            ApplyResult::Updated
        } else {
            ApplyResult::Unchanged
        })
    }
}
