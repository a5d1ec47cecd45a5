//! Ledger of installed components for one run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::classify::ExecutionMode;

/// One installed (or expected but absent) component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub installed_path: PathBuf,
    pub mode: ExecutionMode,
    pub present: bool,
}

/// Append-only list of components, in the order phases recorded them.
///
/// The registry is observational: phases record what they installed and
/// the final report is printed, but nothing reads it to make decisions.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: Vec<Component>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        name: impl Into<String>,
        installed_path: impl Into<PathBuf>,
        mode: ExecutionMode,
        present: bool,
    ) {
        let component = Component {
            name: name.into(),
            installed_path: installed_path.into(),
            mode,
            present,
        };
        debug!(
            component = %component.name,
            path = %component.installed_path.display(),
            mode = %component.mode,
            present = component.present,
            "recorded component"
        );
        self.components.push(component);
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn installed_path(&self, name: &str) -> Option<&Path> {
        self.get(name).map(|c| c.installed_path.as_path())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Groups component names by execution mode.
    ///
    /// Every component lands in exactly one mode bucket; `absent` lists the
    /// subset that was expected but not found on disk.
    #[must_use]
    pub fn report(&self) -> RegistryReport {
        let mut report = RegistryReport::default();
        for component in &self.components {
            let bucket = match component.mode {
                ExecutionMode::Native => &mut report.native,
                ExecutionMode::Emulated => &mut report.emulated,
                ExecutionMode::Unknown => &mut report.unknown,
            };
            bucket.push(component.name.clone());
            if !component.present {
                report.absent.push(component.name.clone());
            }
        }
        report
    }
}

/// Component names grouped by execution mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryReport {
    pub native: Vec<String>,
    pub emulated: Vec<String>,
    pub unknown: Vec<String>,
    pub absent: Vec<String>,
}

impl fmt::Display for RegistryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |names: &[String]| {
            if names.is_empty() {
                "-".to_string()
            } else {
                names.join(", ")
            }
        };
        writeln!(f, "native:   {}", list(&self.native))?;
        writeln!(f, "emulated: {}", list(&self.emulated))?;
        writeln!(f, "unknown:  {}", list(&self.unknown))?;
        write!(f, "absent:   {}", list(&self.absent))
    }
}
