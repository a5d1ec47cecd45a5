//! Error types for the provisioning engine.
//!
//! `ProvisionError` is the single taxonomy shared by every module. Whether a
//! variant is fatal is decided by the orchestrator, not here: a
//! `DownloadError` for an optional artifact is only logged, and a
//! `ConfigParseError` always degrades to an empty document.

use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Network transfer failed after retries and the buffered fallback.
    #[error("download error: {url}: {cause}")]
    DownloadError {
        /// The URL that could not be fetched.
        url: String,
        /// Single-line description of the underlying failure.
        cause: String,
    },

    /// A freshly downloaded artifact did not hash to the configured value.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The file that was hashed.
        path: PathBuf,
        /// The expected checksum.
        expected: String,
        /// The actual checksum.
        actual: String,
    },

    /// A subtree that later phases depend on is absent after extraction.
    #[error("missing artifact: expected `{subtree}` under {root}")]
    MissingArtifactError {
        /// The expected subtree, relative to `root`.
        subtree: String,
        /// The directory that should contain it.
        root: PathBuf,
    },

    /// An existing configuration document could not be parsed.
    #[error("config parse error in {path}: {message}")]
    ConfigParseError {
        /// The configuration file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The merged configuration document could not be persisted.
    #[error("config write error: {path}")]
    ConfigWriteError {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A verification predicate errored or panicked.
    #[error("verification check `{name}` errored: {message}")]
    VerificationCheckError {
        /// Name of the check.
        name: String,
        /// Diagnostic captured from the predicate.
        message: String,
    },

    /// A tool the installation relies on is not resolvable on `PATH`.
    #[error("missing prerequisite: `{tool}` was not found on PATH")]
    PrerequisiteMissing {
        /// The tool name.
        tool: String,
    },

    /// Not enough free space on the installation volume.
    #[error("insufficient disk space at {path}: {available} bytes free, {required} required")]
    InsufficientDiskSpace {
        /// Directory whose volume was probed.
        path: PathBuf,
        /// Free bytes reported by the probe.
        available: u64,
        /// Bytes the plan requires.
        required: u64,
    },

    /// An archive was unreadable or contained an unsafe entry.
    #[error("extraction error: {archive}: {message}")]
    ExtractionError {
        /// The archive being extracted.
        archive: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Error reading or writing files.
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The install plan is malformed or internally inconsistent.
    #[error("plan error: {message}")]
    PlanError {
        /// Description of the problem.
        message: String,
    },

    /// The managed environment could not be applied.
    #[error("environment error: {message}")]
    EnvironmentError {
        /// Description of the problem.
        message: String,
    },
}

impl ProvisionError {
    /// Creates a new `DownloadError`.
    #[must_use]
    pub fn download_error(url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::DownloadError {
            url: url.into(),
            cause: single_line(&cause.into()),
        }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(
        path: PathBuf,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `MissingArtifactError`.
    #[must_use]
    pub fn missing_artifact(subtree: impl Into<String>, root: PathBuf) -> Self {
        Self::MissingArtifactError {
            subtree: subtree.into(),
            root,
        }
    }

    /// Creates a new `ConfigParseError`.
    #[must_use]
    pub fn config_parse(path: PathBuf, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path,
            message: single_line(&message.into()),
        }
    }

    /// Creates a new `ConfigWriteError`.
    #[must_use]
    pub fn config_write(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigWriteError { path, source }
    }

    /// Creates a new `VerificationCheckError`.
    #[must_use]
    pub fn verification_check(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VerificationCheckError {
            name: name.into(),
            message: single_line(&message.into()),
        }
    }

    /// Creates a new `PrerequisiteMissing` error.
    #[must_use]
    pub fn prerequisite_missing(tool: impl Into<String>) -> Self {
        Self::PrerequisiteMissing { tool: tool.into() }
    }

    /// Creates a new `ExtractionError`.
    #[must_use]
    pub fn extraction(archive: PathBuf, message: impl Into<String>) -> Self {
        Self::ExtractionError {
            archive,
            message: single_line(&message.into()),
        }
    }

    /// Creates a new `IoError` from an I/O error with context.
    #[must_use]
    pub fn io_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoError {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `PlanError`.
    #[must_use]
    pub fn plan_error(message: impl Into<String>) -> Self {
        Self::PlanError {
            message: message.into(),
        }
    }

    /// Creates a new `EnvironmentError`.
    #[must_use]
    pub fn environment_error(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }
}

/// Collapses multi-line diagnostics so every error renders on one line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
