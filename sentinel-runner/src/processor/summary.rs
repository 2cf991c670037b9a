// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ErrorDetail, StatusCounts, TestResult, TestResultId};
use chrono::{DateTime, FixedOffset, Local};
use indexmap::IndexMap;
use std::{fmt, time::Duration};

/// The lifecycle of a package within a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageStatus {
    /// Events are still arriving for this package.
    Running,
    /// The package completed with no failed tests.
    Passed,
    /// The package completed with at least one failure.
    Failed,
    /// The package could not be built, so no tests ran.
    BuildFailed {
        /// The build output or launcher error.
        message: String,
    },
}

impl PackageStatus {
    /// Returns a short lowercase name for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::BuildFailed { .. } => "build-failed",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results for one package.
#[derive(Clone, Debug)]
pub struct PackageResult {
    pub(crate) name: String,
    pub(crate) status: PackageStatus,
    pub(crate) tests: Vec<TestResult>,
    pub(crate) by_name: IndexMap<String, TestResultId>,
    pub(crate) roots: Vec<TestResultId>,
    pub(crate) raw_output: String,
    pub(crate) elapsed: Option<Duration>,
}

impl PackageResult {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PackageStatus::Running,
            tests: Vec::new(),
            by_name: IndexMap::new(),
            roots: Vec::new(),
            raw_output: String::new(),
            elapsed: None,
        }
    }

    pub(crate) fn build_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut package = Self::new(name);
        package.status = PackageStatus::BuildFailed {
            message: message.into(),
        };
        package
    }

    /// Returns the package path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the status of the package.
    #[inline]
    pub fn status(&self) -> &PackageStatus {
        &self.status
    }

    /// Returns true if the package completed with no failures.
    ///
    /// A package that is still running is never successful, even if no test has failed yet.
    #[inline]
    pub fn success(&self) -> bool {
        self.status == PackageStatus::Passed
    }

    /// Returns the build failure message, if the package failed to build.
    pub fn build_error(&self) -> Option<&str> {
        match &self.status {
            PackageStatus::BuildFailed { message } => Some(message),
            _ => None,
        }
    }

    /// Returns the build failure as an [`ErrorDetail`] of kind
    /// [`BuildFailure`](super::ErrorKind::BuildFailure).
    pub fn build_error_detail(&self) -> Option<ErrorDetail> {
        self.build_error()
            .map(|message| ErrorDetail::build_failure(message))
    }

    /// Returns true if the package failed to build or has any failed test.
    pub fn has_failures(&self) -> bool {
        matches!(
            self.status,
            PackageStatus::Failed | PackageStatus::BuildFailed { .. }
        ) || self.tests.iter().any(|test| test.status.is_failure())
    }

    /// Returns the test with the given id.
    #[inline]
    pub fn get(&self, id: TestResultId) -> Option<&TestResult> {
        self.tests.get(id.index())
    }

    /// Looks up a test by its full name.
    pub fn find(&self, name: &str) -> Option<&TestResult> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// Returns the top-level tests, in first-seen order.
    pub fn top_level(&self) -> impl Iterator<Item = &TestResult> + '_ {
        self.roots.iter().filter_map(|id| self.get(*id))
    }

    /// Returns the direct children of `test`, in first-seen order.
    pub fn children<'a>(&'a self, test: &'a TestResult) -> impl Iterator<Item = &'a TestResult> + 'a {
        test.children.iter().filter_map(|id| self.get(*id))
    }

    /// Returns every test and subtest, in first-seen order.
    pub fn tests(&self) -> impl Iterator<Item = &TestResult> + '_ {
        self.tests.iter()
    }

    /// Returns counts over every test and subtest in the package.
    pub fn counts(&self) -> StatusCounts {
        self.tests.iter().map(|test| test.status).collect()
    }

    /// Returns the number of tests, including subtests.
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Returns the number of tests that passed.
    pub fn passed_count(&self) -> usize {
        self.counts().passed
    }

    /// Returns the number of tests that failed, timed out or errored.
    pub fn failed_count(&self) -> usize {
        self.counts().failed
    }

    /// Returns the number of tests that were skipped.
    pub fn skipped_count(&self) -> usize {
        self.counts().skipped
    }

    /// Returns the package duration reported by `go test`, or the sum of top-level test
    /// durations if none was reported.
    pub fn duration(&self) -> Duration {
        self.elapsed
            .unwrap_or_else(|| self.top_level().map(TestResult::duration).sum())
    }

    /// Returns the output that wasn't attributed to a test, such as `ok`/`FAIL` lines and
    /// coverage reports.
    #[inline]
    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    pub(crate) fn get_mut(&mut self, id: TestResultId) -> &mut TestResult {
        &mut self.tests[id.index()]
    }
}

/// The results of a run, across every package.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub(crate) packages: Vec<PackageResult>,
    pub(crate) malformed_lines: usize,
    pub(crate) anomalies: usize,
    pub(crate) first_event: Option<DateTime<FixedOffset>>,
    pub(crate) last_event: Option<DateTime<FixedOffset>>,
    pub(crate) finalized: bool,
    pub(crate) started_at: Option<DateTime<Local>>,
    pub(crate) wall_time: Option<Duration>,
}

impl RunSummary {
    /// Returns the packages, in first-seen order.
    #[inline]
    pub fn packages(&self) -> &[PackageResult] {
        &self.packages
    }

    /// Looks up a package by name.
    pub fn package(&self, name: &str) -> Option<&PackageResult> {
        self.packages.iter().find(|package| package.name == name)
    }

    /// Returns counts summed across every package.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for package in &self.packages {
            counts.merge(&package.counts());
        }
        counts
    }

    /// Returns the total number of tests, including subtests.
    pub fn total_tests(&self) -> usize {
        self.counts().total
    }

    /// Returns the number of tests that passed.
    pub fn passed_tests(&self) -> usize {
        self.counts().passed
    }

    /// Returns the number of tests that failed, timed out or errored.
    pub fn failed_tests(&self) -> usize {
        self.counts().failed
    }

    /// Returns the number of tests that were skipped.
    pub fn skipped_tests(&self) -> usize {
        self.counts().skipped
    }

    /// Returns the sum of package durations.
    pub fn total_duration(&self) -> Duration {
        self.packages.iter().map(PackageResult::duration).sum()
    }

    /// Returns the mean duration of finished top-level tests, or `None` if none finished.
    pub fn average_duration(&self) -> Option<Duration> {
        let durations: Vec<Duration> = self
            .packages
            .iter()
            .flat_map(|package| package.top_level())
            .filter(|test| test.status.is_terminal())
            .map(TestResult::duration)
            .collect();
        let count = u32::try_from(durations.len()).ok().filter(|&n| n > 0)?;
        Some(durations.into_iter().sum::<Duration>() / count)
    }

    /// Returns true if at least one package ran and every package passed.
    pub fn is_success(&self) -> bool {
        !self.packages.is_empty() && self.packages.iter().all(PackageResult::success)
    }

    /// Returns the names of packages that failed to build or contain failures.
    pub fn failed_packages(&self) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|package| package.has_failures())
            .map(PackageResult::name)
            .collect()
    }

    /// Returns the number of input lines that could not be parsed as test events.
    #[inline]
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Returns the number of structurally impossible events that were rejected.
    #[inline]
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Returns the timestamps of the first and last events that carried one.
    pub fn event_span(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        self.first_event.zip(self.last_event)
    }

    /// Returns true if this summary was produced after the event stream ended.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns when the run started, if it was driven by a
    /// [`RunCoordinator`](crate::runner::RunCoordinator).
    #[inline]
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    /// Returns how long the run took on the wall clock, if it was driven by a
    /// [`RunCoordinator`](crate::runner::RunCoordinator).
    #[inline]
    pub fn wall_time(&self) -> Option<Duration> {
        self.wall_time
    }
}
