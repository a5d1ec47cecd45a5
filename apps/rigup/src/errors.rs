//! Error types for the rigup CLI.
//!
//! Engine failures arrive as `rigup_provision` errors wrapped in `anyhow`;
//! `CliError` only covers outcomes that need their own exit code.

use thiserror::Error;

/// Errors raised by the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// The installation is incomplete; the report was already printed.
    #[error("verification failed: {failed} of {total} checks failed")]
    VerificationFailed {
        /// Number of failed checks.
        failed: usize,
        /// Number of checks run.
        total: usize,
    },
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::VerificationFailed { .. } => 2,
        }
    }
}
