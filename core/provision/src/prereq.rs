//! Prerequisite checks run before anything is downloaded.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::ProvisionError;
use crate::paths::existing_ancestor;

/// Resolves every tool on `PATH`, returning their locations in order.
///
/// # Errors
///
/// Returns `PrerequisiteMissing` for the first tool that cannot be found.
pub fn check_tools(tools: &[String]) -> Result<Vec<PathBuf>, ProvisionError> {
    tools
        .iter()
        .map(|tool| -> Result<PathBuf, ProvisionError> {
            let path = which::which(tool)
                .map_err(|_| ProvisionError::prerequisite_missing(tool.clone()))?;
            debug!(tool = %tool, path = %path.display(), "found prerequisite");
            Ok(path)
        })
        .collect()
}

/// Reports free space on the volume holding a path.
pub trait DiskProbe {
    /// Returns the bytes available to the current user on the volume that
    /// holds `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the volume cannot be queried.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// [`DiskProbe`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2DiskProbe;

impl DiskProbe for Fs2DiskProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Fails when the volume holding `path` has less than `required` bytes free.
///
/// `path` does not need to exist yet; its nearest existing ancestor is
/// probed. A zero requirement always passes without probing.
///
/// # Errors
///
/// Returns `InsufficientDiskSpace` when space is short and `IoError` when the
/// probe fails.
pub fn check_disk_space(
    probe: &dyn DiskProbe,
    path: &Path,
    required: u64,
) -> Result<u64, ProvisionError> {
    if required == 0 {
        return Ok(0);
    }
    let probed = existing_ancestor(path).unwrap_or(path);
    let available = probe.available_bytes(probed).map_err(|e| {
        ProvisionError::io_error(format!("failed to query free space at {}", probed.display()), e)
    })?;
    debug!(path = %probed.display(), available, required, "disk space");

    if available < required {
        return Err(ProvisionError::InsufficientDiskSpace {
            path: probed.to_path_buf(),
            available,
            required,
        });
    }
    Ok(available)
}
