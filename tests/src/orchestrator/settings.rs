use rigup_provision::orchestrator::{Phase, PhaseOutcome};
use rigup_provision::settings::backup_path;
use serde_json::{Value, json};

use super::{STUDIO_PLAN, studio_fetcher};
use crate::utils::{LINUX_ARM64, LINUX_X64, context, install};

fn read_settings(path: &std::path::Path) -> Value {
    let content = std::fs::read_to_string(path).expect("Should read settings");
    serde_json::from_str(&content).expect("Should parse settings")
}

#[tokio::test]
async fn user_settings_survive_the_merge() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let settings = root.path().join("settings.json");
    std::fs::write(
        &settings,
        "{\n  // personal\n  \"workbench.colorTheme\": \"Dark\",\n  \"editor.tabSize\": 2,\n}\n",
    )
    .expect("Should write settings");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_ARM64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    let merged = read_settings(&settings);
    assert_eq!(merged["workbench.colorTheme"], json!("Dark"));
    assert_eq!(merged["editor.tabSize"], json!(4));
    let runtime_home = root.path().join("toolchain/jbr");
    assert_eq!(
        merged["java.home"],
        json!(runtime_home.display().to_string())
    );

    let report = summary.settings.expect("Should report settings");
    assert!(report.written);
    assert!(!report.recovered_from_parse_error);
    assert!(report.changed_keys.contains(&"editor.tabSize".to_string()));
    assert!(!backup_path(&settings).exists());
}

#[tokio::test]
async fn merge_converges_after_one_run() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let fetcher = studio_fetcher();

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    install(&mut ctx, &fetcher).await.expect("Should install");
    let first = std::fs::read_to_string(root.path().join("settings.json"))
        .expect("Should read settings");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should reinstall");

    let report = summary.settings.expect("Should report settings");
    assert!(!report.written);
    assert!(report.changed_keys.is_empty());
    assert_eq!(
        std::fs::read_to_string(root.path().join("settings.json"))
            .expect("Should read settings"),
        first
    );
}

#[tokio::test]
async fn corrupt_settings_are_backed_up_and_replaced() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let settings = root.path().join("settings.json");
    let corrupt = "{ \"editor.fontSize\": 14, \"unterminated";
    std::fs::write(&settings, corrupt).expect("Should write settings");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let summary = install(&mut ctx, &fetcher).await.expect("Should install");

    assert!(matches!(
        summary.outcome(Phase::MergeConfig),
        Some(PhaseOutcome::Remediated(_))
    ));
    assert_eq!(
        std::fs::read_to_string(backup_path(&settings)).expect("Should read backup"),
        corrupt
    );
    let merged = read_settings(&settings);
    assert_eq!(merged["editor.tabSize"], json!(4));
    assert!(merged.get("editor.fontSize").is_none());
    assert!(summary.verification.all_passed(), "{}", summary.verification.render());
}

#[tokio::test]
async fn environment_block_is_written_once() {
    let root = assert_fs::TempDir::new().expect("Should create temp dir");
    let profile = root.path().join("profile.sh");
    std::fs::write(&profile, "alias ll='ls -l'\n").expect("Should write profile");

    let fetcher = studio_fetcher();
    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let first = install(&mut ctx, &fetcher).await.expect("Should install");
    let written = std::fs::read_to_string(&profile).expect("Should read profile");

    let mut ctx = context(root.path(), STUDIO_PLAN, LINUX_X64);
    let second = install(&mut ctx, &fetcher).await.expect("Should reinstall");

    assert_eq!(first.outcome(Phase::ApplyEnvironment), Some(&PhaseOutcome::Completed));
    assert!(matches!(
        second.outcome(Phase::ApplyEnvironment),
        Some(PhaseOutcome::Skipped(_))
    ));
    assert!(written.starts_with("alias ll='ls -l'\n"));
    assert!(written.contains("STUDIO_HOME"));
    assert_eq!(
        std::fs::read_to_string(&profile).expect("Should read profile"),
        written
    );
    assert_eq!(written.matches("rigup managed environment").count(), 2);
}
