use rigup_provision::cache::CacheStatus;
use rigup_provision::classify::ExecutionMode;
use rigup_provision::orchestrator::{Phase, PhaseOutcome, verify_installation};

use super::{STUDIO_PLAN, studio_fetcher};
use crate::utils::{LINUX_ARM64, LINUX_X64, context, install};

#[tokio::test]
async fn second_run_reuses_everything_and_reports_the_same() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();

    let mut first_ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let first = install(&mut first_ctx, &fetcher)
        .await
        .expect("First run should succeed");
    let requests_after_first = fetcher.requests().len();

    let mut second_ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let second = install(&mut second_ctx, &fetcher)
        .await
        .expect("Second run should succeed");

    assert_eq!(first.registry, second.registry);
    assert_eq!(first.verification.passed(), second.verification.passed());
    assert!(second.verification.all_passed(), "{}", second.verification.render());

    assert_eq!(fetcher.requests().len(), requests_after_first);
    assert!(
        second
            .downloads
            .iter()
            .all(|outcome| outcome.status == CacheStatus::Reused)
    );
    assert!(second.extractions.is_empty(), "{:?}", second.extractions);

    for phase in [
        Phase::Acquire,
        Phase::ExtractPrimary,
        Phase::InstallSecondaryRuntime,
        Phase::WarmCaches,
        Phase::InstallExtensions,
        Phase::MergeConfig,
        Phase::ApplyEnvironment,
    ] {
        assert!(
            matches!(second.outcome(phase), Some(PhaseOutcome::Skipped(_))),
            "{phase} was {:?}",
            second.outcome(phase)
        );
    }
}

#[tokio::test]
async fn first_run_installs_every_component() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);

    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    let install_root = root.path().join("toolchain");
    assert!(install_root.join("bin/studio").is_file());
    assert!(install_root.join("jbr/bin/java").is_file());
    assert!(install_root.join("jbr/lib/modules").is_file());
    assert!(!install_root.join("plugins/ndk").exists());
    assert!(install_root.join("plugins/git/plugin.jar").is_file());
    assert!(root.path().join("m2/repository/index.txt").is_file());
    assert!(root.path().join("samples/hello/Main.kt").is_file());
    assert!(
        root.path()
            .join("extensions/vendor.lang/package.json")
            .is_file()
    );

    assert_eq!(summary.phases.len(), Phase::SEQUENCE.len());
    assert_eq!(summary.registry.native, vec!["runtime"]);
    assert_eq!(summary.registry.emulated, vec!["ide"]);
    assert_eq!(summary.registry.unknown, vec!["launcher", "vendor.lang"]);
    assert!(summary.registry.absent.is_empty());
    assert_eq!(
        ctx.registry.get("runtime").map(|c| c.mode),
        Some(ExecutionMode::Native)
    );
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn bundled_runtime_is_kept_on_other_architectures() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);

    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    assert!(
        !fetcher
            .requests()
            .iter()
            .any(|url| url.contains("jdk-arm64"))
    );
    assert!(matches!(
        summary.outcome(Phase::InstallSecondaryRuntime),
        Some(PhaseOutcome::Skipped(_))
    ));
    assert!(root.path().join("toolchain/jbr/bin/java").is_file());
    assert_eq!(summary.registry.native, vec!["ide"]);
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn verify_matches_what_install_recorded() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    let mut verify_ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let (registry, report) = verify_installation(&mut verify_ctx);

    assert_eq!(registry, summary.registry);
    assert_eq!(report, summary.verification);
}
