// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{LaunchedRun, ProcessLauncher, Renderer, RunRequest};
use crate::{
    config::{SentinelConfig, WatchMode},
    errors::{DisplayErrorChain, LaunchError},
    processor::{EventStreamProcessor, PackageResult, RunSummary},
    time::{StopwatchSnapshot, deadline_after, stopwatch},
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use debug_ignore::DebugIgnore;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use tokio::{io::AsyncBufReadExt, time::Instant};
use tracing::{debug, info, warn};

/// The package name used for a synthesized build failure when a run of every package could not
/// be started.
pub const ALL_PACKAGES: &str = "<all packages>";

/// The maximum number of debounced keys folded into a single run.
const MAX_BATCH: usize = 256;

/// A snapshot of what a [`RunCoordinator`] has done so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchStatus {
    /// True while [`RunCoordinator::watch`] is consuming changes.
    pub is_watching: bool,

    /// The watch mode in effect.
    pub mode: WatchMode,

    /// When watch mode was last entered.
    pub started_at: Option<DateTime<Local>>,

    /// When the last batch of changes arrived.
    pub last_change_at: Option<DateTime<Local>>,

    /// The number of changed keys received, counting every key in a batch.
    pub change_count: usize,

    /// The number of runs started, in or out of watch mode.
    pub runs_started: usize,

    /// The number of runs the launcher failed to start.
    pub launch_failures: usize,
}

impl WatchStatus {
    fn new(mode: WatchMode) -> Self {
        Self {
            is_watching: false,
            mode,
            started_at: None,
            last_change_at: None,
            change_count: 0,
            runs_started: 0,
            launch_failures: 0,
        }
    }
}

/// Runs tests on request or on change, and hands results to a [`Renderer`].
///
/// Runs are strictly sequential, and every run gets a fresh
/// [`EventStreamProcessor`].
#[derive(Debug)]
pub struct RunCoordinator<L, R> {
    launcher: DebugIgnore<L>,
    renderer: DebugIgnore<R>,
    config: SentinelConfig,
    status: WatchStatus,
}

impl<L, R> RunCoordinator<L, R>
where
    L: ProcessLauncher,
    R: Renderer,
{
    /// Creates a new coordinator.
    pub fn new(launcher: L, renderer: R, config: SentinelConfig) -> Self {
        Self {
            launcher: DebugIgnore(launcher),
            renderer: DebugIgnore(renderer),
            status: WatchStatus::new(config.watch.mode),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Returns the renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Returns the number of runs started so far.
    pub fn runs_started(&self) -> usize {
        self.status.runs_started
    }

    /// Returns the coordinator's current status.
    pub fn status(&self) -> &WatchStatus {
        &self.status
    }

    /// Consumes the coordinator, returning the launcher and the renderer.
    pub fn into_parts(self) -> (L, R) {
        (self.launcher.0, self.renderer.0)
    }

    /// Performs a single run and returns its results after rendering them.
    ///
    /// This never fails: if the launcher can't start a run, the returned summary contains
    /// build-failed packages carrying the launcher's error.
    pub async fn run(&mut self, request: RunRequest) -> RunSummary {
        let stopwatch = stopwatch();
        self.status.runs_started += 1;
        info!(run = self.status.runs_started, %request, "starting test run");

        let mut summary = match self.launcher.launch(&request).await {
            Ok(launched) => self.process(launched).await,
            Err(err) => {
                warn!(err = %DisplayErrorChain::new(&err), "failed to launch test run");
                self.status.launch_failures += 1;
                launch_failure_summary(&request, &err)
            }
        };
        finish_timing(&mut summary, stopwatch.snapshot());

        self.renderer.render_summary(&summary);
        info!(
            run = self.status.runs_started,
            passed = summary.passed_tests(),
            failed = summary.failed_tests(),
            skipped = summary.skipped_tests(),
            malformed_lines = summary.malformed_lines(),
            success = summary.is_success(),
            "test run finished",
        );
        summary
    }

    /// Runs tests whenever `changes` yields a package key, until the stream ends.
    ///
    /// Keys that are ready at the same time are folded into one run. With
    /// [`WatchMode::All`] every trigger runs every package.
    pub async fn watch<S>(&mut self, changes: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        let watch = self.config.watch.clone();
        info!(mode = %watch.mode, run_on_start = watch.run_on_start, "entering watch mode");
        self.status.is_watching = true;
        self.status.mode = watch.mode;
        self.status.started_at = Some(Local::now());

        if watch.run_on_start {
            self.run(RunRequest::All).await;
        }

        let mut batches = changes.ready_chunks(MAX_BATCH);
        while let Some(keys) = batches.next().await {
            debug!(changed = ?keys, "change detected");
            self.status.change_count += keys.len();
            self.status.last_change_at = Some(Local::now());
            let request = match watch.mode {
                WatchMode::Changed => RunRequest::packages(keys),
                WatchMode::All => RunRequest::All,
            };
            self.run(request).await;
        }

        self.status.is_watching = false;
        info!(
            changes = self.status.change_count,
            runs = self.status.runs_started,
            "change stream ended, leaving watch mode",
        );
    }

    async fn process(&mut self, launched: LaunchedRun) -> RunSummary {
        let LaunchedRun {
            mut lines,
            build_failures,
        } = launched;
        let progress_interval = self.config.run.progress_interval;

        let mut processor = EventStreamProcessor::new();
        let mut next_progress = deadline_after(Instant::now(), progress_interval);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match lines.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // Anomalies are logged and counted by the processor.
                    _ = processor.feed_line(&String::from_utf8_lossy(&buf));
                }
                Err(err) => {
                    warn!(%err, "error reading test output, treating as end of stream");
                    break;
                }
            }

            let now = Instant::now();
            if now >= next_progress {
                self.renderer.render_progress(&processor.snapshot());
                next_progress = deadline_after(now, progress_interval);
            }
        }

        if let Some(build_failures) = build_failures {
            match build_failures.await {
                Ok(failures) => {
                    for failure in failures {
                        processor.record_build_failure(&failure.package, failure.message);
                    }
                }
                Err(_) => debug!("launcher did not report build failures"),
            }
        }

        let mut summary = processor.finalize();
        self.attach_source_context(&mut summary).await;
        summary
    }

    /// Reads the source around each failure location, for packages whose directory is known.
    async fn attach_source_context(&self, summary: &mut RunSummary) {
        let radius = self.config.run.source_context_lines;
        let mut sources: HashMap<Utf8PathBuf, Option<String>> = HashMap::new();

        for package in &mut summary.packages {
            let Some(dir) = self.launcher.package_dir(&package.name) else {
                continue;
            };
            for test in &mut package.tests {
                let Some(error) = &mut test.error else {
                    continue;
                };
                let Some(location) = error.location.as_ref().filter(|_| error.context.is_none())
                else {
                    continue;
                };
                let path = dir.join(&location.file);

                if !sources.contains_key(&path) {
                    let contents = match tokio::fs::read_to_string(&path).await {
                        Ok(contents) => Some(contents),
                        Err(err) => {
                            debug!(%path, %err, "could not read source for failure context");
                            None
                        }
                    };
                    sources.insert(path.clone(), contents);
                }
                if let Some(Some(contents)) = sources.get(&path) {
                    error.attach_source(contents, radius);
                }
            }
        }
    }
}

fn launch_failure_summary(request: &RunRequest, err: &LaunchError) -> RunSummary {
    let message = DisplayErrorChain::new(err).to_string();
    let packages = match request {
        RunRequest::Packages(packages) if !packages.is_empty() => packages
            .iter()
            .map(|package| PackageResult::build_failed(package.as_str(), message.clone()))
            .collect(),
        _ => vec![PackageResult::build_failed(ALL_PACKAGES, message)],
    };
    RunSummary {
        packages,
        finalized: true,
        ..Default::default()
    }
}

fn finish_timing(summary: &mut RunSummary, snapshot: StopwatchSnapshot) {
    summary.started_at = Some(snapshot.start_time);
    summary.wall_time = Some(snapshot.duration);
}
