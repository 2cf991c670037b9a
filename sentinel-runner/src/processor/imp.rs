// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ErrorDetail, ErrorKind, PackageResult, PackageStatus, RunSummary, StatusCounts, TestResult,
    TestResultId, TestStatus, annotation::TIMEOUT_MARKER,
};
use crate::{errors::ProcessingError, helpers::split_test_name};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use sentinel_metadata::{TestAction, TestEvent};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Markers `go test` prints in place of test results when a package couldn't be built.
const BUILD_FAILURE_MARKERS: &[&str] = &["[build failed]", "[setup failed]"];

/// Consumes the events of one run and maintains a result tree per package.
///
/// A processor is not reused across runs. It is single-threaded: events must be fed by one
/// caller, in order.
#[derive(Debug, Default)]
pub struct EventStreamProcessor {
    packages: IndexMap<String, PackageResult>,
    malformed_lines: usize,
    anomalies: usize,
    first_event: Option<DateTime<FixedOffset>>,
    last_event: Option<DateTime<FixedOffset>>,
}

impl EventStreamProcessor {
    /// Creates a new processor with no packages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and applies a single line of `go test -json` output.
    ///
    /// Blank lines are ignored. Lines that aren't test events (for example, compiler output
    /// interleaved with the JSON stream) are counted and skipped.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ProcessingError> {
        match TestEvent::parse_line(line) {
            Ok(Some(event)) => self.feed(event),
            Ok(None) => Ok(()),
            Err(err) => {
                self.malformed_lines += 1;
                debug!(line = err.line(), "skipping line that isn't a test event");
                Ok(())
            }
        }
    }

    /// Applies a single event.
    ///
    /// Returns an error only for events that can't be applied to the tree, such as a terminal
    /// action for a test that was never seen. The event is dropped in that case and the
    /// processor remains usable.
    pub fn feed(&mut self, event: TestEvent) -> Result<(), ProcessingError> {
        if let Some(time) = event.time {
            self.first_event.get_or_insert(time);
            self.last_event = Some(time);
        }

        let package = self
            .packages
            .entry(event.package.clone())
            .or_insert_with_key(|name| {
                debug!(package = %name, "first event for package");
                PackageResult::new(name.clone())
            });

        let res = if event.is_package_level() {
            package.apply_package_event(&event);
            Ok(())
        } else {
            package.apply_test_event(&event)
        };
        if let Err(err) = &res {
            self.anomalies += 1;
            warn!(%err, "dropping test event");
        }
        res
    }

    /// Records that `package` failed to build.
    ///
    /// A package that fails to build produces no test events, so launchers report build
    /// failures separately.
    pub fn record_build_failure(&mut self, package: &str, message: impl Into<String>) {
        let message = message.into();
        debug!(package, "recording build failure");
        let result = self
            .packages
            .entry(package.to_owned())
            .or_insert_with(|| PackageResult::new(package));
        result.status = PackageStatus::BuildFailed { message };
    }

    /// Returns the number of lines that couldn't be parsed so far.
    #[inline]
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Returns the current, possibly partial, results.
    pub fn snapshot(&self) -> RunSummary {
        self.summary(self.packages.values().cloned().collect(), false)
    }

    /// Completes the run and returns the final results.
    ///
    /// Packages that never reported a result are completed, and tests that never reported a
    /// result become [`TestStatus::Error`] (or [`TestStatus::Timeout`] if `go test` reported a
    /// timeout). Placeholder parents take the combined result of their subtests.
    pub fn finalize(mut self) -> RunSummary {
        for package in self.packages.values_mut() {
            if package.status == PackageStatus::Running {
                debug!(package = %package.name, "package did not report a result");
                package.complete(false);
            } else {
                package.reconcile();
                if package.status == PackageStatus::Passed && package.has_failures() {
                    package.status = PackageStatus::Failed;
                }
            }
        }
        let packages = std::mem::take(&mut self.packages).into_values().collect();
        self.summary(packages, true)
    }

    fn summary(&self, packages: Vec<PackageResult>, finalized: bool) -> RunSummary {
        RunSummary {
            packages,
            malformed_lines: self.malformed_lines,
            anomalies: self.anomalies,
            first_event: self.first_event,
            last_event: self.last_event,
            finalized,
            started_at: None,
            wall_time: None,
        }
    }
}

impl PackageResult {
    fn apply_package_event(&mut self, event: &TestEvent) {
        match event.action {
            TestAction::Output => self.raw_output.push_str(&event.output),
            TestAction::Pass | TestAction::Skip => {
                self.elapsed = event.elapsed_duration().or(self.elapsed);
                self.complete(false);
            }
            TestAction::Fail => {
                self.elapsed = event.elapsed_duration().or(self.elapsed);
                self.complete(true);
            }
            _ => trace!(package = %self.name, action = %event.action, "ignoring package event"),
        }
    }

    fn apply_test_event(&mut self, event: &TestEvent) -> Result<(), ProcessingError> {
        let name = event.test.as_str();
        match event.action {
            TestAction::Run => {
                let (id, created) = self.ensure_test(name, TestStatus::Running);
                let node = self.get_mut(id);
                if created {
                    node.start_time = event.time;
                } else if node.status == TestStatus::Pending {
                    node.status = TestStatus::Running;
                    node.start_time = event.time;
                } else if node.status == TestStatus::Running && node.placeholder {
                    node.placeholder = false;
                    node.start_time = event.time;
                    debug!(package = %node.package, test = name, "placeholder started running");
                } else {
                    trace!(package = %node.package, test = name, "ignoring repeated run event");
                }
            }
            TestAction::Output => {
                let (id, _) = self.ensure_test(name, TestStatus::Pending);
                self.get_mut(id).output.push_fragment(&event.output);
            }
            TestAction::Pass | TestAction::Fail | TestAction::Skip => {
                self.finish_test(event)?;
            }
            _ => trace!(package = %self.name, test = name, action = %event.action, "ignoring test event"),
        }
        Ok(())
    }

    fn finish_test(&mut self, event: &TestEvent) -> Result<(), ProcessingError> {
        let name = event.test.as_str();
        let Some(&id) = self.by_name.get(name) else {
            return Err(ProcessingError::UnknownTest {
                package: self.name.clone(),
                test: name.to_owned(),
                action: event.action.to_string(),
            });
        };

        let node = self.get_mut(id);
        if node.status.is_terminal() {
            return Err(ProcessingError::AlreadyFinished {
                package: node.package.clone(),
                test: name.to_owned(),
                status: node.status,
            });
        }

        let failed_subtests = node.rollup.failed;
        let (status, error) = match event.action {
            TestAction::Pass if failed_subtests > 0 => (
                TestStatus::Failed,
                Some(ErrorDetail::subtest_failure(failed_subtests)),
            ),
            TestAction::Pass => (TestStatus::Passed, None),
            TestAction::Skip => (TestStatus::Skipped, None),
            _ => {
                let detail = ErrorDetail::from_output(node.output.lines(), failed_subtests);
                let status = if detail.kind == ErrorKind::Timeout {
                    TestStatus::Timeout
                } else {
                    TestStatus::Failed
                };
                (status, Some(detail))
            }
        };

        trace!(package = %node.package, test = name, %status, "test finished");
        node.finish(status, event.elapsed_duration(), event.time);
        node.error = error;
        self.propagate_from(id);
        Ok(())
    }

    /// Completes the package after a package-level terminal event, or at the end of the stream.
    fn complete(&mut self, reported_failure: bool) {
        self.reconcile();
        if matches!(self.status, PackageStatus::BuildFailed { .. }) {
            return;
        }

        if reported_failure
            && self.tests.is_empty()
            && BUILD_FAILURE_MARKERS
                .iter()
                .any(|marker| self.raw_output.contains(marker))
        {
            self.status = PackageStatus::BuildFailed {
                message: self.raw_output.trim().to_owned(),
            };
        } else if reported_failure || self.tests.iter().any(|test| test.status.is_failure()) {
            self.status = PackageStatus::Failed;
        } else {
            self.status = PackageStatus::Passed;
        }
        debug!(package = %self.name, status = %self.status, "package completed");
    }

    /// Forces every unfinished test to a terminal status and recomputes rollups.
    fn reconcile(&mut self) {
        let timeout = self
            .raw_output
            .contains(TIMEOUT_MARKER)
            .then(|| ErrorDetail::timeout(&self.raw_output));

        // Children are always created after their parents, so walking backwards visits every
        // child before its parent.
        for index in (0..self.tests.len()).rev() {
            let id = TestResultId::new(index);
            let (rollup, children_duration) = self.children_summary(id);
            let node = self.get_mut(id);
            node.rollup = rollup;

            if node.status.is_terminal() {
                if node.status == TestStatus::Passed && rollup.failed > 0 {
                    node.status = TestStatus::Failed;
                    node.error = Some(ErrorDetail::subtest_failure(rollup.failed));
                }
                continue;
            }

            let takes_children_result = !node.children.is_empty()
                && (node.placeholder || node.status == TestStatus::Pending);
            let (status, error, duration) = if takes_children_result {
                let status = if rollup.failed > 0 {
                    TestStatus::Failed
                } else if rollup.skipped == rollup.total {
                    TestStatus::Skipped
                } else {
                    TestStatus::Passed
                };
                let error = (rollup.failed > 0).then(|| ErrorDetail::subtest_failure(rollup.failed));
                (status, error, Some(children_duration))
            } else if let Some(timeout) = &timeout {
                (TestStatus::Timeout, Some(timeout.clone()), None)
            } else {
                (TestStatus::Error, Some(ErrorDetail::unfinished()), None)
            };

            debug!(
                package = %node.package,
                test = %node.name,
                placeholder = node.placeholder,
                %status,
                "forcing unfinished test",
            );
            node.finish(status, duration, None);
            node.error = error;
        }
    }

    /// Returns the id of the test named `name`, creating it (and any missing ancestors) if
    /// necessary. The boolean is true if the test was created.
    fn ensure_test(&mut self, name: &str, status: TestStatus) -> (TestResultId, bool) {
        if let Some(&id) = self.by_name.get(name) {
            return (id, false);
        }

        let parent = split_test_name(name)
            .0
            .map(|parent| self.ensure_placeholder(parent));
        let id = TestResultId::new(self.tests.len());
        self.tests
            .push(TestResult::new(id, name, self.name.clone(), status));
        self.by_name.insert(name.to_owned(), id);
        match parent {
            Some(parent) => self.get_mut(parent).children.push(id),
            None => self.roots.push(id),
        }
        (id, true)
    }

    fn ensure_placeholder(&mut self, name: &str) -> TestResultId {
        let (id, created) = self.ensure_test(name, TestStatus::Running);
        if created {
            debug!(package = %self.name, test = name, "creating placeholder parent");
            self.get_mut(id).placeholder = true;
        }
        id
    }

    /// Recomputes rollups from `id` up to its root, flipping passed ancestors of a failure.
    fn propagate_from(&mut self, id: TestResultId) {
        let mut next = self.parent_id(id);
        while let Some(id) = next {
            let (rollup, _) = self.children_summary(id);
            let node = self.get_mut(id);
            node.rollup = rollup;
            if node.status == TestStatus::Passed && rollup.failed > 0 {
                debug!(package = %node.package, test = %node.name, "subtest failure marks parent failed");
                node.status = TestStatus::Failed;
                node.error = Some(ErrorDetail::subtest_failure(rollup.failed));
            }
            next = self.parent_id(id);
        }
    }

    fn parent_id(&self, id: TestResultId) -> Option<TestResultId> {
        let parent = self.get(id)?.parent_name()?;
        self.by_name.get(parent).copied()
    }

    fn children_summary(&self, id: TestResultId) -> (StatusCounts, Duration) {
        let mut counts = StatusCounts::default();
        let mut duration = Duration::ZERO;
        for child in self.get(id).into_iter().flat_map(|node| self.children(node)) {
            counts.add(child.status);
            duration += child.duration();
        }
        (counts, duration)
    }
}
