//! SHA-256 verification of freshly downloaded artifacts.
//!
//! The size lower bound in the plan is the baseline integrity check. A
//! configured `sha256` strengthens it, but only right after a download: a
//! cached file that passes the size check is never re-hashed.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::ProvisionError;

/// Verifies that a file matches the expected SHA-256 checksum.
///
/// # Errors
///
/// Returns `IoError` if the file cannot be read and `ChecksumMismatch` if the
/// computed digest differs from `expected` (compared case-insensitively).
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<(), ProvisionError> {
    let computed = compute_sha256(file_path)?;

    if computed != expected.to_lowercase() {
        return Err(ProvisionError::checksum_mismatch(
            file_path.to_path_buf(),
            expected.to_lowercase(),
            computed,
        ));
    }

    Ok(())
}

/// Computes the SHA-256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns `IoError` if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String, ProvisionError> {
    let mut file = std::fs::File::open(file_path).map_err(|e| {
        ProvisionError::io_error(
            format!("failed to open {} for checksum", file_path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| {
            ProvisionError::io_error(
                format!("failed to read {} for checksum", file_path.display()),
                e,
            )
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
