//! Path management for rigup installations.
//!
//! The default root directory is `~/.rigup/`, which can be overridden by
//! setting the `RIGUP_HOME` environment variable.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.rigup/                   # Root directory (or RIGUP_HOME)
//!   rigup.toml                # Default install plan
//!   downloads/                # Artifact cache
//!     bundle.zip
//!     bundle.zip.partial      # In-flight resumable transfer
//!   toolchain/                # Primary install tree
//!     bin/
//!     jbr/                    # Secondary runtime (when installed)
//!   extensions/               # Editor extension packages
//!     vendor.lang-support/
//! ```
//!
//! Nothing in this tree records install progress: every run re-derives what
//! is present from the files themselves.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::errors::ProvisionError;

/// Environment variable to override the default root directory.
pub const RIGUP_HOME_ENV: &str = "RIGUP_HOME";

/// Environment variable naming the install plan file.
pub const RIGUP_PLAN_ENV: &str = "RIGUP_PLAN";

/// File name of the default install plan inside the root directory.
const PLAN_FILE: &str = "rigup.toml";

/// Resolved directories for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// Root directory for all rigup data (`~/.rigup` or `RIGUP_HOME`).
    pub root: PathBuf,
    /// Directory for cached downloads.
    pub downloads: PathBuf,
    /// Destination of the primary archive.
    pub install: PathBuf,
    /// Directory holding one subdirectory per extension package.
    pub extensions: PathBuf,
}

impl InstallPaths {
    /// Creates a new `InstallPaths` instance.
    ///
    /// The root directory is determined by:
    /// 1. The `RIGUP_HOME` environment variable if set
    /// 2. On Windows: `%APPDATA%\rigup`
    /// 3. On Unix: `~/.rigup` in the user's home directory
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let root = if let Ok(home) = std::env::var(RIGUP_HOME_ENV) {
            PathBuf::from(home)
        } else {
            #[cfg(windows)]
            {
                dirs::data_dir()
                    .context("Cannot determine AppData directory. Set RIGUP_HOME environment variable.")?
                    .join("rigup")
            }
            #[cfg(not(windows))]
            {
                dirs::home_dir()
                    .context("Cannot determine home directory. Set RIGUP_HOME environment variable.")?
                    .join(".rigup")
            }
        };

        Ok(Self::with_root(root))
    }

    /// Creates a new `InstallPaths` instance with a specific root directory.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            downloads: root.join("downloads"),
            install: root.join("toolchain"),
            extensions: root.join("extensions"),
            root,
        }
    }

    /// Returns the install plan path: `RIGUP_PLAN` if set, else
    /// `<root>/rigup.toml`.
    #[must_use]
    pub fn plan_file(&self) -> PathBuf {
        std::env::var(RIGUP_PLAN_ENV).map_or_else(|_| self.root.join(PLAN_FILE), PathBuf::from)
    }

    /// Returns the cache location of a downloaded file.
    #[must_use = "returns the path without side effects"]
    pub fn download_path(&self, filename: &str) -> PathBuf {
        self.downloads.join(filename)
    }

    /// Returns the installation directory of an extension package.
    #[must_use = "returns the path without side effects"]
    pub fn extension_dir(&self, id: &str) -> PathBuf {
        self.extensions.join(id)
    }

    /// Creates the root, downloads and extensions directories.
    ///
    /// The primary install directory is left to the extractor so that its
    /// absence keeps meaning "never extracted".
    ///
    /// # Errors
    ///
    /// Returns `IoError` if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<(), ProvisionError> {
        for dir in [&self.root, &self.downloads, &self.extensions] {
            std::fs::create_dir_all(dir).map_err(|e| {
                ProvisionError::io_error(format!("failed to create directory: {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Expands a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Returns the nearest ancestor of `path` (including itself) that exists.
#[must_use]
pub fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}
