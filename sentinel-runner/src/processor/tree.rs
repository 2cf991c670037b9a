// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ErrorDetail;
use crate::helpers::split_test_name;
use chrono::{DateTime, FixedOffset};
use std::{fmt, time::Duration};

/// Identifies a [`TestResult`] within its [`PackageResult`](super::PackageResult).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestResultId(usize);

impl TestResultId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index of this test within its package, in first-seen order.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The status of a single test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestStatus {
    /// Output was seen, but the test hasn't started running.
    Pending,
    /// The test is running.
    Running,
    /// The test passed.
    Passed,
    /// The test failed.
    Failed,
    /// The test was skipped.
    Skipped,
    /// The test was still running when `go test` hit its timeout.
    Timeout,
    /// The test never reported a result.
    Error,
}

impl TestStatus {
    /// Returns true if the test has finished.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true for statuses counted as failures: failed, timeout and error.
    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout | Self::Error)
    }

    /// Returns a short lowercase name for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts of tests by status.
///
/// `failed` includes timeouts and errors. Tests that haven't finished are counted in `total` and
/// `unfinished` only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// The total number of tests.
    pub total: usize,
    /// The number of tests that passed.
    pub passed: usize,
    /// The number of tests that failed, timed out or errored.
    pub failed: usize,
    /// The number of tests that were skipped.
    pub skipped: usize,
    /// The number of tests that are pending or running.
    pub unfinished: usize,
}

impl StatusCounts {
    /// Adds a test with the given status.
    pub fn add(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Failed | TestStatus::Timeout | TestStatus::Error => self.failed += 1,
            TestStatus::Pending | TestStatus::Running => self.unfinished += 1,
        }
    }

    /// Adds up the counts of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unfinished += other.unfinished;
    }

    /// Returns the number of tests that have finished.
    #[inline]
    pub fn finished(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

impl FromIterator<TestStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = TestStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}

/// Accumulated output of a test, as whole lines.
///
/// `go test -json` splits output into fragments that usually, but not always, end in a
/// newline. A fragment without a trailing newline is continued by the next one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputLines {
    lines: Vec<String>,
    open: bool,
}

impl OutputLines {
    pub(crate) fn push_fragment(&mut self, fragment: &str) {
        for piece in fragment.split_inclusive('\n') {
            let (text, terminated) = match piece.strip_suffix('\n') {
                Some(text) => (text.strip_suffix('\r').unwrap_or(text), true),
                None => (piece, false),
            };
            match self.lines.last_mut() {
                Some(last) if self.open => last.push_str(text),
                _ => self.lines.push(text.to_owned()),
            }
            self.open = !terminated;
        }
    }

    /// Returns the lines, without trailing newlines.
    #[inline]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns true if no output was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns all lines joined by `\n`.
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

/// A node in a package's test tree.
///
/// Nodes are owned by their [`PackageResult`](super::PackageResult); a parent refers to its
/// children by [`TestResultId`], and a child refers to its parent only by name.
#[derive(Clone, Debug)]
pub struct TestResult {
    pub(crate) id: TestResultId,
    pub(crate) name: String,
    pub(crate) package: String,
    pub(crate) status: TestStatus,
    pub(crate) output: OutputLines,
    pub(crate) error: Option<ErrorDetail>,
    pub(crate) children: Vec<TestResultId>,
    pub(crate) parent: Option<String>,
    pub(crate) placeholder: bool,
    pub(crate) start_time: Option<DateTime<FixedOffset>>,
    pub(crate) end_time: Option<DateTime<FixedOffset>>,
    pub(crate) duration: Option<Duration>,
    pub(crate) rollup: StatusCounts,
}

impl TestResult {
    pub(crate) fn new(
        id: TestResultId,
        name: impl Into<String>,
        package: impl Into<String>,
        status: TestStatus,
    ) -> Self {
        let name = name.into();
        let parent = split_test_name(&name).0.map(str::to_owned);
        Self {
            id,
            name,
            package: package.into(),
            status,
            output: OutputLines::default(),
            error: None,
            children: Vec::new(),
            parent,
            placeholder: false,
            start_time: None,
            end_time: None,
            duration: None,
            rollup: StatusCounts::default(),
        }
    }

    /// Returns the id of this test within its package.
    #[inline]
    pub fn id(&self) -> TestResultId {
        self.id
    }

    /// Returns the full `/`-delimited name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the last segment of the name.
    pub fn leaf_name(&self) -> &str {
        split_test_name(&self.name).1
    }

    /// Returns the package this test belongs to.
    #[inline]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the status.
    #[inline]
    pub fn status(&self) -> TestStatus {
        self.status
    }

    /// Returns the output lines recorded for this test.
    #[inline]
    pub fn output(&self) -> &OutputLines {
        &self.output
    }

    /// Returns structured information about the failure, if the test failed.
    #[inline]
    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// Returns the ids of direct children, in first-seen order.
    #[inline]
    pub fn children(&self) -> &[TestResultId] {
        &self.children
    }

    /// Returns the full name of the parent, if this is a subtest.
    #[inline]
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns true if this node was created because a subtest referred to it, and its own
    /// `run` event hasn't been seen.
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Returns the time of the `run` event.
    #[inline]
    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        self.start_time
    }

    /// Returns the time of the terminal event.
    #[inline]
    pub fn end_time(&self) -> Option<DateTime<FixedOffset>> {
        self.end_time
    }

    /// Returns the elapsed time reported by `go test`, or zero if none was reported.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration.unwrap_or_default()
    }

    /// Returns counts over the statuses of direct children.
    #[inline]
    pub fn rollup(&self) -> StatusCounts {
        self.rollup
    }

    pub(crate) fn finish(
        &mut self,
        status: TestStatus,
        duration: Option<Duration>,
        end_time: Option<DateTime<FixedOffset>>,
    ) {
        self.status = status;
        self.placeholder = false;
        if duration.is_some() {
            self.duration = duration;
        }
        if end_time.is_some() {
            self.end_time = end_time;
        }
    }
}
