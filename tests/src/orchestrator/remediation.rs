use rigup_provision::cache::CacheStatus;
use rigup_provision::classify::ExecutionMode;
use rigup_provision::orchestrator::{Phase, PhaseOutcome, verify_installation};
use rigup_provision::platform::{Arch, Host, Os};

use super::{BUNDLE_URL, STUDIO_PLAN, bundle_zip, studio_fetcher};
use crate::utils::{LINUX_ARM64, LINUX_X64, context, elf_binary, install, pe_binary, zip_bytes};

#[tokio::test]
async fn partial_runtime_directory_is_removed_and_reinstalled() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    install(&mut ctx, &fetcher).await.expect("Should install");

    let jbr = root.path().join("toolchain/jbr");
    std::fs::remove_file(jbr.join("bin/java")).expect("Should remove probe");
    std::fs::write(jbr.join("leftover.tmp"), b"partial").expect("Should write leftover");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should reinstall");

    assert!(matches!(
        summary.outcome(Phase::InstallSecondaryRuntime),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert!(jbr.join("bin/java").is_file());
    assert!(!jbr.join("leftover.tmp").exists());
    assert_eq!(
        ctx.registry.get("runtime").map(|c| c.mode),
        Some(ExecutionMode::Native)
    );
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn interrupted_runtime_extraction_is_completed() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let jbr = root.path().join("toolchain/jbr");
    std::fs::create_dir_all(jbr.join("bin")).expect("Should create runtime dir");
    std::fs::write(jbr.join("bin/java"), elf_binary(Arch::Arm64)).expect("Should write java");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    assert!(matches!(
        summary.outcome(Phase::InstallSecondaryRuntime),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert!(jbr.join("lib/modules").is_file());
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn verify_reports_incomplete_runtime() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    install(&mut ctx, &fetcher).await.expect("Should install");

    std::fs::remove_file(root.path().join("toolchain/jbr/lib/modules"))
        .expect("Should remove runtime modules");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let (_, report) = verify_installation(&mut ctx);

    let failures: Vec<&str> = report.failures().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(failures, vec!["runtime runtime"]);
    assert!(report.failures()[0].detail.ends_with("incomplete"));
}

#[tokio::test]
async fn foreign_architecture_runtime_is_replaced() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let jbr = root.path().join("toolchain/jbr/bin");
    std::fs::create_dir_all(&jbr).expect("Should create runtime dir");
    std::fs::write(jbr.join("java"), elf_binary(Arch::X64)).expect("Should write x64 java");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    assert!(matches!(
        summary.outcome(Phase::InstallSecondaryRuntime),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert_eq!(summary.registry.native, vec!["runtime"]);
}

#[tokio::test]
async fn undersized_cached_artifact_is_downloaded_again() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let downloads = root.path().join("downloads");
    std::fs::create_dir_all(&downloads).expect("Should create downloads");
    std::fs::write(downloads.join("studio.zip"), b"PK\x03").expect("Should write stub");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    let bundle = summary
        .downloads
        .iter()
        .find(|outcome| outcome.name == "bundle")
        .expect("Should record bundle");
    assert_eq!(bundle.status, CacheStatus::Redownloaded);
    assert!(matches!(
        summary.outcome(Phase::Acquire),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert_eq!(
        std::fs::read(downloads.join("studio.zip")).expect("Should read bundle"),
        bundle_zip()
    );
    assert_eq!(
        fetcher
            .requests()
            .iter()
            .filter(|url| *url == BUNDLE_URL)
            .count(),
        1
    );
}

#[tokio::test]
async fn cache_without_marker_is_rebuilt() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    install(&mut ctx, &fetcher).await.expect("Should install");

    let samples = root.path().join("samples");
    std::fs::remove_file(samples.join("README.md")).expect("Should remove marker");
    std::fs::write(samples.join("stale.txt"), b"stale").expect("Should write stale file");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should rebuild");

    assert!(matches!(
        summary.outcome(Phase::WarmCaches),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert!(samples.join("README.md").is_file());
    assert!(!samples.join("stale.txt").exists());
    assert!(root.path().join("m2/repository/index.txt").is_file());
}

#[tokio::test]
async fn extension_without_marker_is_reinstalled() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    install(&mut ctx, &fetcher).await.expect("Should install");

    let extension = root.path().join("extensions/vendor.lang");
    std::fs::remove_file(extension.join("package.json")).expect("Should remove marker");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should reinstall");

    assert!(matches!(
        summary.outcome(Phase::InstallExtensions),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert!(extension.join("package.json").is_file());
    assert!(extension.join("out/main.js").is_file());
}

#[tokio::test]
async fn failed_check_does_not_hide_the_others() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    std::fs::remove_file(root.path().join("toolchain/bin/studio")).expect("Should remove ide");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let (registry, report) = verify_installation(&mut ctx);

    let failures: Vec<&str> = report.failures().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(failures, vec!["component ide"]);
    assert_eq!(report.total(), summary.verification.total());
    assert_eq!(report.passed(), report.total() - 1);
    assert_eq!(registry.absent, vec!["ide"]);
}

#[tokio::test]
async fn windows_on_arm_reports_emulated_components() {
    const PLAN: &str = r#"
[[artifacts]]
name = "bundle"
url = "https://dl.example.com/win.zip"

[primary]
artifact = "bundle"
subtrees = [{ path = "bin" }]

[[components]]
name = "ide"
path = "bin/studio64.exe"

[[components]]
name = "helper"
path = "bin/helper.exe"
"#;
    let studio = pe_binary(Arch::X64);
    let helper = pe_binary(Arch::Arm64);
    let fetcher = crate::utils::FakeFetcher::new().serve(
        "https://dl.example.com/win.zip",
        zip_bytes(&[("bin/studio64.exe", &studio), ("bin/helper.exe", &helper)]),
    );
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let host = Host::new(Os::Windows, Arch::Arm64);
    let mut ctx = context(root.path(), PLAN, host);

    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    assert_eq!(summary.registry.native, vec!["helper"]);
    assert_eq!(summary.registry.emulated, vec!["ide"]);
}
