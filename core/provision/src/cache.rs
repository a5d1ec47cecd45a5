//! Artifact cache: reuse a previous download or fetch a fresh one.
//!
//! Validation is a size heuristic. A cached file at least
//! `expected_min_bytes` long is reused as-is; a shorter one is treated as a
//! truncated earlier download, deleted and fetched again.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checksum::verify_checksum;
use crate::download::{Fetcher, ProgressCallback};
use crate::errors::ProvisionError;
use crate::plan::Artifact;

/// How `ensure_cached` satisfied an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The cached file was valid; nothing was downloaded.
    Reused,
    /// No cached file existed.
    Downloaded,
    /// A cached file below the size bound was replaced.
    Redownloaded,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reused => "reused",
            Self::Downloaded => "downloaded",
            Self::Redownloaded => "redownloaded",
        })
    }
}

/// Result of caching one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOutcome {
    pub name: String,
    pub path: PathBuf,
    pub status: CacheStatus,
}

/// Downloads directory plus the network port used to fill it.
pub struct CacheStore<'a, F: Fetcher> {
    fetcher: &'a F,
    downloads: PathBuf,
    progress: Option<ProgressCallback>,
}

impl<'a, F: Fetcher> CacheStore<'a, F> {
    #[must_use]
    pub fn new(fetcher: &'a F, downloads: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            downloads: downloads.into(),
            progress: None,
        }
    }

    /// Reports transfer progress of fresh downloads to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Returns where `artifact` is cached.
    #[must_use]
    pub fn path_of(&self, artifact: &Artifact) -> PathBuf {
        artifact.dest(&self.downloads)
    }

    /// Returns whether the cached copy of `artifact` passes the size check.
    #[must_use]
    pub fn is_valid(&self, artifact: &Artifact) -> bool {
        file_len(&self.path_of(artifact)).is_some_and(|len| len >= artifact.expected_min_bytes)
    }

    /// Makes sure a valid copy of `artifact` exists and returns its path.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` when the transfer fails or produces a file
    /// below the size bound, `ChecksumMismatch` when a configured digest does
    /// not match, and `IoError` when a stale file cannot be removed.
    pub async fn ensure_cached(&self, artifact: &Artifact) -> Result<CacheOutcome, ProvisionError> {
        let dest = self.path_of(artifact);

        let status = match file_len(&dest) {
            Some(len) if len >= artifact.expected_min_bytes => {
                debug!(artifact = %artifact.name, len, "cached artifact is valid");
                return Ok(CacheOutcome {
                    name: artifact.name.clone(),
                    path: dest,
                    status: CacheStatus::Reused,
                });
            }
            Some(len) => {
                info!(
                    artifact = %artifact.name,
                    len,
                    expected_min_bytes = artifact.expected_min_bytes,
                    "cached artifact is undersized, downloading again"
                );
                std::fs::remove_file(&dest).map_err(|e| {
                    ProvisionError::io_error(format!("failed to remove {}", dest.display()), e)
                })?;
                CacheStatus::Redownloaded
            }
            None => CacheStatus::Downloaded,
        };

        info!(artifact = %artifact.name, url = %artifact.url, "downloading");
        self.fetcher
            .fetch(&artifact.url, &dest, self.progress.as_ref())
            .await?;

        let len = file_len(&dest).unwrap_or(0);
        if len < artifact.expected_min_bytes {
            let _ = std::fs::remove_file(&dest);
            return Err(ProvisionError::download_error(
                &artifact.url,
                format!(
                    "received {len} bytes, expected at least {}",
                    artifact.expected_min_bytes
                ),
            ));
        }

        if let Some(expected) = &artifact.sha256
            && let Err(e) = verify_checksum(&dest, expected)
        {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }

        Ok(CacheOutcome {
            name: artifact.name.clone(),
            path: dest,
            status,
        })
    }
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
}
