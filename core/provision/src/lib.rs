#![warn(clippy::pedantic)]

//! # rigup provisioning engine
//!
//! Installs and verifies a multi-component developer toolchain described by
//! a declarative [`plan::InstallPlan`]: a primary archive, an optional
//! architecture-specific runtime that replaces a bundled one, pre-warmed
//! caches, editor extensions, merged user settings and shell environment.
//!
//! The [`orchestrator`] runs a fixed sequence of phases. Each phase derives
//! from disk whether its work is already done, so running an install twice
//! is a no-op and running it after a failure resumes where it stopped.
//!
//! ## Modules
//!
//! - [`plan`] - Plan file format and placeholder expansion
//! - [`download`] / [`cache`] - Resumable downloads and the artifact cache
//! - [`archive`] - Zip and tar.gz extraction with exclusions
//! - [`classify`] - Native/emulated classification from binary headers
//! - [`settings`] - Non-destructive JSON settings merge
//! - [`environment`] - Managed shell profile block
//! - [`verify`] / [`checks`] - Post-install verification
//!
//! ## Example
//!
//! ```no_run
//! use rigup_provision::download::HttpFetcher;
//! use rigup_provision::orchestrator::{InstallContext, Orchestrator};
//! use rigup_provision::paths::InstallPaths;
//! use rigup_provision::plan::InstallPlan;
//! use rigup_provision::platform::Host;
//! use rigup_provision::prereq::Fs2DiskProbe;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let paths = InstallPaths::new()?;
//! let plan = InstallPlan::load(&paths.plan_file())?;
//! let mut ctx = InstallContext::new(plan, paths, Host::detect()?)?;
//!
//! let fetcher = HttpFetcher::new()?;
//! let summary = Orchestrator::new(&fetcher, &Fs2DiskProbe).run(&mut ctx).await?;
//! println!("{}", summary.verification.render());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod checks;
pub mod checksum;
pub mod classify;
pub mod download;
pub mod environment;
pub mod errors;
pub mod orchestrator;
pub mod paths;
pub mod plan;
pub mod platform;
pub mod prereq;
pub mod registry;
pub mod settings;
pub mod verify;
