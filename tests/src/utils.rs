use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use rigup_provision::download::{Fetcher, ProgressCallback};
use rigup_provision::errors::ProvisionError;
use rigup_provision::orchestrator::{InstallContext, Orchestrator, PhaseFailure, RunSummary};
use rigup_provision::paths::InstallPaths;
use rigup_provision::plan::InstallPlan;
use rigup_provision::platform::{Arch, Host, Os};
use rigup_provision::prereq::DiskProbe;

pub(crate) const LINUX_X64: Host = Host {
    os: Os::Linux,
    arch: Arch::X64,
};

pub(crate) const LINUX_ARM64: Host = Host {
    os: Os::Linux,
    arch: Arch::Arm64,
};

/// Serves fixed bodies by URL and counts requests.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("Should lock").clone()
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        _progress: Option<&ProgressCallback>,
    ) -> Result<(), ProvisionError> {
        self.requests
            .lock()
            .expect("Should lock")
            .push(url.to_string());
        let Some(body) = self.bodies.get(url) else {
            return Err(ProvisionError::download_error(url, "HTTP error 404 Not Found"));
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).expect("Should create downloads dir");
        }
        std::fs::write(dest, body).expect("Should write download");
        Ok(())
    }
}

/// Reports a fixed amount of free space.
pub(crate) struct FixedProbe(pub u64);

impl DiskProbe for FixedProbe {
    fn available_bytes(&self, _path: &Path) -> std::io::Result<u64> {
        Ok(self.0)
    }
}

pub(crate) fn context(root: &Path, plan: &str, host: Host) -> InstallContext {
    let plan = InstallPlan::from_toml_str(plan).expect("Should parse plan");
    InstallContext::new(plan, InstallPaths::with_root(root.to_path_buf()), host)
        .expect("Should build context")
}

pub(crate) async fn install(
    ctx: &mut InstallContext,
    fetcher: &FakeFetcher,
) -> Result<RunSummary, PhaseFailure> {
    install_with_disk(ctx, fetcher, &FixedProbe(u64::MAX)).await
}

pub(crate) async fn install_with_disk(
    ctx: &mut InstallContext,
    fetcher: &FakeFetcher,
    disk: &FixedProbe,
) -> Result<RunSummary, PhaseFailure> {
    Orchestrator::new(fetcher, disk).run(ctx).await
}

/// Builds a zip archive in memory.
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(*name, options).expect("Should start file");
        zip.write_all(content).expect("Should write entry");
    }
    zip.finish().expect("Should finish zip").into_inner()
}

/// A minimal little-endian ELF64 header for `arch`.
pub(crate) fn elf_binary(arch: Arch) -> Vec<u8> {
    let machine: u16 = match arch {
        Arch::X86 => 0x03,
        Arch::X64 => 0x3e,
        Arch::Arm64 => 0xb7,
    };
    let mut bytes = vec![0u8; 64];
    bytes[0..4].copy_from_slice(b"\x7fELF");
    bytes[4] = 2;
    bytes[5] = 1;
    bytes[0x12..0x14].copy_from_slice(&machine.to_le_bytes());
    bytes
}

/// A minimal PE image for `arch`.
pub(crate) fn pe_binary(arch: Arch) -> Vec<u8> {
    let machine: u16 = match arch {
        Arch::X86 => 0x14c,
        Arch::X64 => 0x8664,
        Arch::Arm64 => 0xaa64,
    };
    let mut bytes = vec![0u8; 0x90];
    bytes[0..2].copy_from_slice(b"MZ");
    bytes[0x3c..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    bytes[0x80..0x84].copy_from_slice(b"PE\0\0");
    bytes[0x84..0x86].copy_from_slice(&machine.to_le_bytes());
    bytes
}
