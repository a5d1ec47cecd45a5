//! Host platform detection.
//!
//! The classification of installed components depends on the architecture of
//! the *machine*, not of the running process. On Windows an x64 process on an
//! ARM64 machine runs under emulation and `std::env::consts::ARCH` reports
//! `x86_64`, so the machine architecture is read from
//! `PROCESSOR_ARCHITEW6432` (set only for emulated processes) before falling
//! back to `PROCESSOR_ARCHITECTURE`.
//!
//! ## Supported Architectures
//!
//! - `x86` (32-bit Intel)
//! - `x64` (`x86_64` / AMD64)
//! - `arm64` (`aarch64`)

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A CPU architecture that binaries can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 32-bit Intel.
    #[serde(alias = "i386", alias = "i686")]
    X86,
    /// 64-bit Intel/AMD.
    #[serde(alias = "x86_64", alias = "amd64")]
    X64,
    /// 64-bit ARM.
    #[serde(alias = "aarch64")]
    Arm64,
}

impl Arch {
    /// Parses an architecture name as used by Rust targets, Windows
    /// environment variables and common release naming.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Some(Self::X86),
            "x64" | "x86_64" | "amd64" => Some(Self::X64),
            "arm64" | "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// Returns the identifier used in plans and reports.
    #[must_use = "returns the architecture string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operating system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// Returns the OS this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else {
            Self::Linux
        }
    }

    #[must_use = "returns the OS string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

/// The machine the installation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Host {
    pub os: Os,
    pub arch: Arch,
}

impl Host {
    /// Creates a host description explicitly. Used by tests and by callers
    /// that already know the target machine.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the current host.
    ///
    /// # Errors
    ///
    /// Returns an error if the machine architecture is not one of the
    /// supported architectures.
    pub fn detect() -> Result<Self> {
        let os = Os::current();
        let arch = if os == Os::Windows {
            windows_machine_arch().or_else(|| Arch::from_name(std::env::consts::ARCH))
        } else {
            Arch::from_name(std::env::consts::ARCH)
        };

        let Some(arch) = arch else {
            bail!(
                "Unsupported architecture: {} on {}. \
                 Supported architectures are: x86, x64, arm64",
                std::env::consts::ARCH,
                os.as_str()
            );
        };

        Ok(Self { os, arch })
    }

    /// Returns the executable file extension for this host.
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Macos => "",
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch)
    }
}

/// Reads the machine architecture Windows exposes to the current process.
fn windows_machine_arch() -> Option<Arch> {
    std::env::var("PROCESSOR_ARCHITEW6432")
        .ok()
        .and_then(|v| Arch::from_name(&v))
        .or_else(|| {
            std::env::var("PROCESSOR_ARCHITECTURE")
                .ok()
                .and_then(|v| Arch::from_name(&v))
        })
}
