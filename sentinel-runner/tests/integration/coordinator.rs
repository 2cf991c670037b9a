// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, eyre};
use futures::stream;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sentinel_runner::{
    config::{SentinelConfig, WatchMode},
    processor::{ErrorKind, PackageStatus, TestStatus},
    runner::{ALL_PACKAGES, BuildFailure, RunCoordinator, RunRequest},
    watch::Debouncer,
};
use std::time::Duration;
use tokio::time::sleep;

fn config() -> SentinelConfig {
    SentinelConfig::default()
}

#[tokio::test]
async fn run_renders_final_summary() {
    test_init();

    let launcher = FakeLauncher::new(MIXED_RUN);
    let mut coordinator = RunCoordinator::new(launcher.clone(), RecordingRenderer::default(), config());

    let summary = coordinator.run(RunRequest::All).await;

    assert!(summary.is_finalized());
    assert_eq!(summary.total_tests(), 3);
    assert_eq!(summary.failed_packages(), vec!["example.com/strs"]);
    assert!(summary.started_at().is_some());
    assert!(summary.wall_time().is_some());
    assert_eq!(launcher.requests(), vec![RunRequest::All]);
    assert_eq!(coordinator.runs_started(), 1);

    let rendered = &coordinator.renderer().summaries;
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].total_tests(), 3);
}

#[tokio::test]
async fn each_run_gets_a_fresh_processor() {
    test_init();

    let launcher = FakeLauncher::new(MIXED_RUN);
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config());

    let first = coordinator.run(RunRequest::All).await;
    let second = coordinator.run(RunRequest::All).await;

    // Trees from two runs are never merged.
    assert_eq!(first.total_tests(), 3);
    assert_eq!(second.total_tests(), 3);
    assert_eq!(second.packages().len(), 3);
    assert_eq!(coordinator.renderer().summaries.len(), 2);
}

#[tokio::test]
async fn progress_snapshots() {
    test_init();

    let mut config = config();
    config.run.progress_interval = Duration::ZERO;
    let mut coordinator = RunCoordinator::new(
        FakeLauncher::new(MIXED_RUN),
        RecordingRenderer::default(),
        config,
    );

    coordinator.run(RunRequest::All).await;

    // With no throttling, every line produces a snapshot.
    let renderer = coordinator.renderer();
    assert_eq!(renderer.progress.len(), MIXED_RUN.lines().count());
    assert!(renderer.progress.iter().all(|s| !s.is_finalized()));
    assert_eq!(renderer.summaries.len(), 1);
}

#[tokio::test]
async fn unbounded_progress_interval() {
    test_init();

    let mut config = config();
    config.run.progress_interval = Duration::MAX;
    let mut coordinator = RunCoordinator::new(
        FakeLauncher::new(MIXED_RUN),
        RecordingRenderer::default(),
        config,
    );

    let summary = coordinator.run(RunRequest::All).await;

    assert_eq!(summary.total_tests(), 3);
    assert!(coordinator.renderer().progress.is_empty());
    assert_eq!(coordinator.renderer().summaries.len(), 1);
}

#[tokio::test]
async fn launch_failure_for_packages() {
    test_init();

    let launcher = FakeLauncher::failing("go: command not found");
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config());

    let summary = coordinator
        .run(RunRequest::packages(["example.com/b", "example.com/a"]))
        .await;

    let packages: Vec<_> = summary
        .packages()
        .iter()
        .map(|p| (p.name(), p.build_error()))
        .collect();
    assert_eq!(
        packages,
        vec![
            ("example.com/a", Some("go: command not found")),
            ("example.com/b", Some("go: command not found")),
        ]
    );
    assert!(!summary.is_success());
    assert_eq!(coordinator.renderer().summaries.len(), 1);
}

#[tokio::test]
async fn launch_failure_for_all_packages() {
    test_init();

    let mut coordinator = RunCoordinator::new(
        FakeLauncher::failing("permission denied"),
        RecordingRenderer::default(),
        config(),
    );

    let summary = coordinator.run(RunRequest::All).await;

    assert_eq!(summary.packages().len(), 1);
    let package = &summary.packages()[0];
    assert_eq!(package.name(), ALL_PACKAGES);
    assert_eq!(
        *package.status(),
        PackageStatus::BuildFailed {
            message: "permission denied".to_owned()
        }
    );
}

#[tokio::test]
async fn launch_failure_for_empty_package_set() {
    test_init();

    let launcher = FakeLauncher::failing("go: command not found");
    let mut coordinator =
        RunCoordinator::new(launcher.clone(), RecordingRenderer::default(), config());

    // Built directly so the empty set reaches the coordinator unnormalized.
    let summary = coordinator
        .run(RunRequest::Packages(Default::default()))
        .await;

    let packages: Vec<_> = summary
        .packages()
        .iter()
        .map(|p| (p.name(), p.build_error()))
        .collect();
    assert_eq!(packages, vec![(ALL_PACKAGES, Some("go: command not found"))]);
    assert_eq!(summary.failed_packages(), vec![ALL_PACKAGES]);
    assert!(!summary.is_success());
    assert_eq!(coordinator.status().launch_failures, 1);

    let summary = coordinator.run(RunRequest::packages(Vec::<String>::new())).await;
    assert_eq!(summary.failed_packages(), vec![ALL_PACKAGES]);
    assert_eq!(launcher.requests()[1], RunRequest::All);
}

#[tokio::test]
async fn out_of_band_build_failures() {
    test_init();

    let launcher = FakeLauncher::new(MIXED_RUN).with_build_failure(BuildFailure::new(
        "example.com/broken",
        "broken.go:3:9: undefined: missing",
    ));
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config());

    let summary = coordinator.run(RunRequest::All).await;

    let broken = summary
        .package("example.com/broken")
        .expect("build failure is recorded");
    assert_eq!(broken.build_error(), Some("broken.go:3:9: undefined: missing"));
    assert_eq!(broken.test_count(), 0);
    assert_eq!(
        summary.failed_packages(),
        vec!["example.com/strs", "example.com/broken"]
    );
}

#[tokio::test]
async fn read_error_ends_the_stream() {
    test_init();

    let output = indoc! {r#"
        {"Action":"run","Package":"p","Test":"TestDone"}
        {"Action":"pass","Package":"p","Test":"TestDone","Elapsed":0}
        {"Action":"run","Package":"p","Test":"TestCutOff"}
    "#};
    let launcher = FakeLauncher::new(output).with_read_error();
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config());

    let summary = coordinator.run(RunRequest::All).await;

    let package = summary.package("p").expect("package exists");
    assert_eq!(
        package.find("TestDone").map(|t| t.status()),
        Some(TestStatus::Passed)
    );
    let cut_off = package.find("TestCutOff").expect("test exists");
    assert_eq!(cut_off.status(), TestStatus::Error);
    assert_eq!(cut_off.error().map(|e| e.kind), Some(ErrorKind::Unfinished));
}

#[tokio::test]
async fn failures_get_source_context() -> Result<()> {
    test_init();

    let dir = Utf8TempDir::new()?;
    std::fs::write(
        dir.path().join("strs_test.go"),
        indoc! {r#"
            package strs

            func TestReverse(t *testing.T) {
            	t.Errorf("Reverse(%q) = %q; want %q", "ab", Reverse("ab"), "ba")
            }
        "#},
    )?;

    let launcher = FakeLauncher::new(MIXED_RUN).with_package_dir(dir.path().to_owned());
    let mut config = config();
    config.run.source_context_lines = 1;
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config);

    let summary = coordinator.run(RunRequest::All).await;

    let error = summary
        .package("example.com/strs")
        .and_then(|p| p.find("TestReverse"))
        .and_then(|t| t.error())
        .ok_or_else(|| eyre!("TestReverse has an error"))?;
    let context = error
        .context
        .as_ref()
        .ok_or_else(|| eyre!("source context was attached"))?;
    assert_eq!(context.first_line, 3);
    assert_eq!(context.lines.len(), 3);
    assert_eq!(context.highlighted, 1);
    assert!(context.highlighted_line().contains("t.Errorf"));
    assert_eq!(error.location.as_ref().and_then(|l| l.column), Some(2));

    Ok(())
}

#[tokio::test]
async fn missing_source_is_not_an_error() {
    test_init();

    let launcher = FakeLauncher::new(MIXED_RUN).with_package_dir("/this/path/does/not/exist".into());
    let mut coordinator = RunCoordinator::new(launcher, RecordingRenderer::default(), config());

    let summary = coordinator.run(RunRequest::All).await;
    let error = summary
        .package("example.com/strs")
        .and_then(|p| p.find("TestReverse"))
        .and_then(|t| t.error())
        .expect("TestReverse has an error");
    assert_eq!(error.context, None);
}

#[tokio::test]
async fn watch_runs_on_start_then_batches_changes() {
    test_init();

    let launcher = FakeLauncher::new(MIXED_RUN);
    let mut coordinator = RunCoordinator::new(launcher.clone(), RecordingRenderer::default(), config());

    let changes = stream::iter(["pkg/b".to_owned(), "pkg/a".to_owned(), "pkg/b".to_owned()]);
    coordinator.watch(changes).await;

    assert_eq!(
        launcher.requests(),
        vec![
            RunRequest::All,
            RunRequest::packages(["pkg/a", "pkg/b"]),
        ]
    );
    assert_eq!(coordinator.renderer().summaries.len(), 2);

    let status = coordinator.status();
    assert!(!status.is_watching);
    assert_eq!(status.mode, WatchMode::Changed);
    assert_eq!(status.change_count, 3);
    assert_eq!(status.runs_started, 2);
    assert_eq!(status.launch_failures, 0);
    assert!(status.started_at.is_some());
    assert!(status.last_change_at >= status.started_at);
}

#[tokio::test]
async fn status_before_watching() {
    test_init();

    let coordinator =
        RunCoordinator::new(FakeLauncher::new(MIXED_RUN), RecordingRenderer::default(), config());

    let status = coordinator.status();
    assert!(!status.is_watching);
    assert_eq!(status.started_at, None);
    assert_eq!(status.last_change_at, None);
    assert_eq!(status.change_count, 0);
    assert_eq!(status.runs_started, 0);
}

#[tokio::test]
async fn watch_mode_all() {
    test_init();

    let mut config = config();
    config.watch.mode = WatchMode::All;
    config.watch.run_on_start = false;
    let launcher = FakeLauncher::new(MIXED_RUN);
    let mut coordinator = RunCoordinator::new(launcher.clone(), RecordingRenderer::default(), config);

    coordinator.watch(stream::iter(["pkg/a".to_owned()])).await;

    assert_eq!(launcher.requests(), vec![RunRequest::All]);
}

#[tokio::test(start_paused = true)]
async fn watch_with_debouncer() {
    test_init();

    let mut config = config();
    config.watch.run_on_start = false;
    let launcher = FakeLauncher::new(MIXED_RUN);
    let mut coordinator = RunCoordinator::new(launcher.clone(), RecordingRenderer::default(), config);

    let mut debouncer = Debouncer::spawn(coordinator.config().watch.debounce);
    let events = debouncer.events();
    let handle = debouncer.handle();
    let producer = tokio::spawn(async move {
        // A save touching two packages, in a burst.
        handle.notify("pkg/a");
        handle.notify("pkg/b");
        sleep(Duration::from_millis(100)).await;
        handle.notify("pkg/a");
        sleep(Duration::from_secs(1)).await;
        handle.notify("pkg/b");
        sleep(Duration::from_secs(1)).await;
        debouncer.close();
    });

    coordinator.watch(events).await;
    producer.await.expect("producer task succeeded");

    assert_eq!(
        launcher.requests(),
        vec![
            RunRequest::packages(["pkg/b"]),
            RunRequest::packages(["pkg/a"]),
            RunRequest::packages(["pkg/b"]),
        ]
    );
}
