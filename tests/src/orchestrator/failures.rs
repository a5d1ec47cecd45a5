use rigup_provision::errors::ProvisionError;
use rigup_provision::orchestrator::{Phase, PhaseOutcome};

use super::{
    BUNDLE_URL, LANG_URL, RUNTIME_URL, SAMPLES_URL, STUDIO_PLAN, bundle_zip,
    bundle_zip_without_lib, runtime_zip, samples_zip, studio_fetcher,
};
use crate::utils::{
    FakeFetcher, FixedProbe, LINUX_ARM64, LINUX_X64, context, install, install_with_disk,
};

#[tokio::test]
async fn missing_required_subtree_halts_and_rerun_resumes() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher().serve(BUNDLE_URL, bundle_zip_without_lib());

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let failure = install(&mut ctx, &fetcher)
        .await
        .expect_err("Should halt on the missing subtree");

    assert_eq!(failure.phase, Phase::ExtractPrimary);
    assert!(matches!(
        &failure.error,
        ProvisionError::MissingArtifactError { subtree, .. } if subtree == "lib"
    ));
    assert!(
        failure
            .to_string()
            .starts_with("extract-primary phase failed: missing artifact: expected `lib`")
    );

    // Later phases never ran.
    assert!(!root.path().join("m2").exists());
    assert!(!root.path().join("settings.json").exists());
    // Earlier work stays.
    assert!(root.path().join("downloads/samples.zip").is_file());
    assert!(root.path().join("toolchain/bin/studio").is_file());

    // A corrected artifact lands in the cache; the rerun only extracts.
    std::fs::write(root.path().join("downloads/studio.zip"), bundle_zip())
        .expect("Should replace bundle");
    let requests_before = fetcher.requests().len();

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Rerun should succeed");

    assert_eq!(fetcher.requests().len(), requests_before);
    assert!(matches!(
        summary.outcome(Phase::Acquire),
        Some(PhaseOutcome::Skipped(_))
    ));
    assert_eq!(summary.outcome(Phase::ExtractPrimary), Some(&PhaseOutcome::Completed));
    assert!(root.path().join("toolchain/lib/core.jar").is_file());
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn required_download_failure_halts_in_acquire() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = FakeFetcher::new()
        .serve(BUNDLE_URL, bundle_zip())
        .serve(LANG_URL, super::lang_vsix());

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let failure = install(&mut ctx, &fetcher)
        .await
        .expect_err("Should fail without the samples archive");

    assert_eq!(failure.phase, Phase::Acquire);
    assert!(failure.to_string().contains(SAMPLES_URL));
    assert!(!root.path().join("toolchain").exists());
}

#[tokio::test]
async fn optional_artifact_failure_is_reported_not_fatal() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = FakeFetcher::new()
        .serve(BUNDLE_URL, bundle_zip())
        .serve(RUNTIME_URL, runtime_zip())
        .serve(SAMPLES_URL, samples_zip());

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher)
        .await
        .expect("Optional extension should not halt the run");

    assert_eq!(summary.registry.absent, vec!["vendor.lang"]);
    let failures: Vec<&str> = summary
        .verification
        .failures()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(failures, vec!["extension vendor.lang"]);

    // Everything else is cached now, but the phase is still not satisfied.
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let rerun = install(&mut ctx, &fetcher).await.expect("Should rerun");
    assert_eq!(rerun.outcome(Phase::Acquire), Some(&PhaseOutcome::Completed));
}

#[tokio::test]
async fn insufficient_disk_space_halts_before_any_download() {
    const PLAN: &str = r#"
[install]
min_free_bytes = 1000000

[[artifacts]]
name = "bundle"
url = "https://dl.example.com/studio.zip"

[primary]
artifact = "bundle"
"#;
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), PLAN, LINUX_X64);

    let failure = install_with_disk(&mut ctx, &fetcher, &FixedProbe(1000))
        .await
        .expect_err("Should halt on disk space");

    assert_eq!(failure.phase, Phase::Prereq);
    assert!(matches!(
        failure.error,
        ProvisionError::InsufficientDiskSpace {
            available: 1000,
            required: 1_000_000,
            ..
        }
    ));
    assert!(fetcher.requests().is_empty());

    // Once everything is in place no space is needed.
    let mut ctx = context(root.path(), PLAN, LINUX_X64);
    install(&mut ctx, &fetcher).await.expect("Should install");
    let mut ctx = context(root.path(), PLAN, LINUX_X64);
    let summary = install_with_disk(&mut ctx, &fetcher, &FixedProbe(1000))
        .await
        .expect("Complete install should not need space");
    assert!(matches!(
        summary.outcome(Phase::Prereq),
        Some(PhaseOutcome::Skipped(_))
    ));
}

#[tokio::test]
async fn partially_extracted_tree_still_needs_disk_space() {
    const PLAN: &str = r#"
[install]
min_free_bytes = 1000000

[[artifacts]]
name = "bundle"
url = "https://dl.example.com/studio.zip"

[primary]
artifact = "bundle"
"#;
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), PLAN, LINUX_X64);
    install(&mut ctx, &fetcher).await.expect("Should install");

    std::fs::remove_dir_all(root.path().join("toolchain/lib")).expect("Should remove lib");

    let mut ctx = context(root.path(), PLAN, LINUX_X64);
    let failure = install_with_disk(&mut ctx, &fetcher, &FixedProbe(10))
        .await
        .expect_err("Should halt on disk space");

    assert_eq!(failure.phase, Phase::Prereq);
    assert!(matches!(
        failure.error,
        ProvisionError::InsufficientDiskSpace { available: 10, .. }
    ));
    assert!(!root.path().join("toolchain/lib").exists());
}

#[tokio::test]
async fn missing_required_tool_halts_in_prereq() {
    const PLAN: &str = r#"
[install]
required_tools = ["rigup-test-tool-that-does-not-exist"]

[[artifacts]]
name = "bundle"
url = "https://dl.example.com/studio.zip"

[primary]
artifact = "bundle"
"#;
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), PLAN, LINUX_X64);

    let failure = install(&mut ctx, &fetcher)
        .await
        .expect_err("Should halt on the missing tool");

    assert_eq!(failure.phase, Phase::Prereq);
    assert!(matches!(
        &failure.error,
        ProvisionError::PrerequisiteMissing { tool } if tool == "rigup-test-tool-that-does-not-exist"
    ));
    assert!(fetcher.requests().is_empty());
}
