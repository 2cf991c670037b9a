// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort extraction of structured failure information from test output.
//!
//! Go tests report failures as free text. The shapes recognized here are the ones produced by
//! `t.Errorf` and friends (`file_test.go:12: message`), testify-style assertion blocks
//! (`expected: X` / `actual: Y`), the common `got X, want Y` idiom, panics, and `go test`'s own
//! timeout panic. Nothing here is required for correctness: an unrecognized failure still
//! produces an [`ErrorDetail`] with a message.

use crate::helpers::plural;
use regex::Regex;
use std::{fmt, sync::LazyLock};

/// The line `go test` prints when the `-timeout` deadline is hit.
pub(crate) const TIMEOUT_MARKER: &str = "panic: test timed out after";

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w./\\-]+\.go):(\d+)(?::(\d+))?:\s?(.*)$").unwrap());
static PANIC_FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+_test\.go):(\d+)(?:\s+\+0x[0-9a-f]+)?$").unwrap());
static ERROR_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Error:\s*(.+)$").unwrap());
static EXPECTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:expected|want)\s*:\s*(.*)$").unwrap());
static ACTUAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:actual|got)\s*:\s*(.*)$").unwrap());
static GOT_WANT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bgot:?\s+(.+?),?\s+want(?:ed)?:?\s+(.+)$").unwrap()
});
static EXPECTED_GOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bexpected:?\s+(.+?),?\s+(?:but\s+)?(?:got|actual):?\s+(.+)$").unwrap()
});
static RESULT_WANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\s*(.+?);\s*want\s+(.+)$").unwrap());

/// Calls that mark the start of an assertion on a source line, in order of preference.
const ASSERTION_CALLS: &[&str] = &["t.Errorf", "t.Error", "t.Fatalf", "t.Fatal"];

/// The classification of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A plain failure without a more specific shape.
    Failure,
    /// An assertion with expected and/or actual values.
    Assertion,
    /// The test panicked.
    Panic,
    /// The test hit the `go test` timeout.
    Timeout,
    /// The test has no error of its own, but one or more of its subtests failed.
    SubtestFailure,
    /// The package could not be built, or the test process could not be started.
    BuildFailure,
    /// The test never reported a result.
    Unfinished,
}

impl ErrorKind {
    /// Returns a short lowercase name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::Assertion => "assertion",
            Self::Panic => "panic",
            Self::Timeout => "timeout",
            Self::SubtestFailure => "subtest-failure",
            Self::BuildFailure => "build-failure",
            Self::Unfinished => "unfinished",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the source a failure was reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// The file, as printed by Go. Usually a base name relative to the package directory;
    /// absolute for panic stack frames.
    pub file: String,
    /// The 1-based line number.
    pub line: usize,
    /// The 1-based column, if known.
    pub column: Option<usize>,
}

/// Source lines surrounding a failure location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceContext {
    /// The lines, in order.
    pub lines: Vec<String>,
    /// The index into `lines` of the offending line.
    pub highlighted: usize,
    /// The 1-based line number of `lines[0]`.
    pub first_line: usize,
}

impl SourceContext {
    /// Extracts up to `radius` lines on either side of the 1-based `line` from `contents`.
    ///
    /// Returns `None` if `line` is out of range.
    pub fn extract(contents: &str, line: usize, radius: usize) -> Option<Self> {
        let all: Vec<&str> = contents.lines().collect();
        if line == 0 || line > all.len() {
            return None;
        }
        let index = line - 1;
        let start = index.saturating_sub(radius);
        let end = all.len().min(index.saturating_add(radius).saturating_add(1));
        Some(Self {
            lines: all[start..end].iter().map(|l| (*l).to_owned()).collect(),
            highlighted: index - start,
            first_line: start + 1,
        })
    }

    /// Returns the offending line.
    pub fn highlighted_line(&self) -> &str {
        self.lines
            .get(self.highlighted)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Structured information about a failed test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// The classification.
    pub kind: ErrorKind,
    /// A one-line message.
    pub message: String,
    /// Where the failure was reported, if that could be determined.
    pub location: Option<SourceLocation>,
    /// The expected value of an assertion.
    pub expected: Option<String>,
    /// The actual value of an assertion.
    pub actual: Option<String>,
    /// Source lines around `location`, filled in after the run if the source was readable.
    pub context: Option<SourceContext>,
}

impl ErrorDetail {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
            context: None,
        }
    }

    pub(crate) fn subtest_failure(failed_subtests: usize) -> Self {
        Self::new(
            ErrorKind::SubtestFailure,
            format!(
                "failed due to {failed_subtests} failed {}",
                plural::subtests_str(failed_subtests)
            ),
        )
    }

    pub(crate) fn unfinished() -> Self {
        Self::new(ErrorKind::Unfinished, "test did not report a result")
    }

    pub(crate) fn timeout(package_output: &str) -> Self {
        let message = package_output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(TIMEOUT_MARKER))
            .unwrap_or("test timed out");
        Self::new(ErrorKind::Timeout, message)
    }

    pub(crate) fn build_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BuildFailure, message)
    }

    /// Parses the accumulated output lines of a failed test.
    ///
    /// `failed_subtests` is the number of direct children that failed, used when the output
    /// carries no error of its own.
    pub(crate) fn from_output(lines: &[String], failed_subtests: usize) -> Self {
        let mut parsed = ParsedOutput::default();
        for line in lines {
            parsed.observe(line.trim());
        }
        parsed.finish(failed_subtests)
    }

    /// Fills in [`context`](Self::context) from the source file's contents, and refines the
    /// column if the output didn't carry one.
    pub fn attach_source(&mut self, contents: &str, radius: usize) {
        let Some(location) = &mut self.location else {
            return;
        };
        let Some(context) = SourceContext::extract(contents, location.line, radius) else {
            return;
        };
        if location.column.is_none() {
            location.column = guess_column(context.highlighted_line());
        }
        self.context = Some(context);
    }
}

#[derive(Debug, Default)]
struct ParsedOutput<'a> {
    location: Option<SourceLocation>,
    message: Option<&'a str>,
    first_plain: Option<&'a str>,
    expected: Option<String>,
    actual: Option<String>,
    saw_panic: bool,
    saw_timeout: bool,
}

impl<'a> ParsedOutput<'a> {
    fn observe(&mut self, line: &'a str) {
        if line.is_empty() || is_framing(line) {
            return;
        }

        if line.starts_with(TIMEOUT_MARKER) {
            self.saw_timeout = true;
        }
        if let Some(panic) = line.strip_prefix("panic: ") {
            self.saw_panic = true;
            if self.message.is_none() {
                let panic = panic.strip_suffix("[recovered]").unwrap_or(panic).trim_end();
                self.message = Some(if self.saw_timeout { line } else { panic });
            }
            return;
        }

        if self.location.is_none() {
            if let Some(caps) = LOCATION_RE.captures(line) {
                self.location = Some(location_from(&caps[1], &caps[2], caps.get(3)));
                let message = caps.get(4).map_or("", |m| m.as_str().trim());
                if !message.is_empty() && self.message.is_none() {
                    self.message = Some(message);
                    self.observe_inline(message);
                }
                return;
            } else if self.saw_panic
                && let Some(caps) = PANIC_FRAME_RE.captures(line)
            {
                self.location = Some(location_from(&caps[1], &caps[2], None));
                return;
            }
        }

        if let Some(caps) = EXPECTED_RE.captures(line) {
            self.expected.get_or_insert_with(|| caps[1].trim().to_owned());
            return;
        }
        if let Some(caps) = ACTUAL_RE.captures(line) {
            self.actual.get_or_insert_with(|| caps[1].trim().to_owned());
            return;
        }
        if self.message.is_none()
            && let Some(caps) = ERROR_FIELD_RE.captures(line)
            && let Some(message) = caps.get(1)
        {
            self.message = Some(message.as_str().trim());
            return;
        }

        self.observe_inline(line);
        self.first_plain.get_or_insert(line);
    }

    fn observe_inline(&mut self, text: &str) {
        if self.expected.is_some() || self.actual.is_some() {
            return;
        }
        // (actual, expected) capture order for each shape.
        let pair = if let Some(caps) = GOT_WANT_RE.captures(text) {
            Some((caps[1].to_owned(), caps[2].to_owned()))
        } else if let Some(caps) = EXPECTED_GOT_RE.captures(text) {
            Some((caps[2].to_owned(), caps[1].to_owned()))
        } else {
            RESULT_WANT_RE
                .captures(text)
                .map(|caps| (caps[1].to_owned(), caps[2].to_owned()))
        };
        if let Some((actual, expected)) = pair {
            self.actual = Some(actual.trim().to_owned());
            self.expected = Some(expected.trim().to_owned());
        }
    }

    fn finish(self, failed_subtests: usize) -> ErrorDetail {
        let has_values = self.expected.is_some() || self.actual.is_some();
        let has_direct_error =
            self.location.is_some() || self.saw_panic || self.saw_timeout || has_values;

        if !has_direct_error && failed_subtests > 0 {
            return ErrorDetail::subtest_failure(failed_subtests);
        }

        let message = self
            .message
            .or(self.first_plain)
            .unwrap_or("test failed")
            .to_owned();
        let kind = if self.saw_timeout {
            ErrorKind::Timeout
        } else if self.saw_panic {
            ErrorKind::Panic
        } else if has_values || message.to_lowercase().contains("expected") {
            ErrorKind::Assertion
        } else {
            ErrorKind::Failure
        };

        ErrorDetail {
            kind,
            message,
            location: self.location,
            expected: self.expected,
            actual: self.actual,
            context: None,
        }
    }
}

fn is_framing(line: &str) -> bool {
    line.starts_with("=== ") || line.starts_with("--- ")
}

fn location_from(file: &str, line: &str, column: Option<regex::Match<'_>>) -> SourceLocation {
    SourceLocation {
        file: file.to_owned(),
        line: line.parse().unwrap_or_default(),
        column: column.and_then(|m| m.as_str().parse().ok()),
    }
}

/// Guesses the 1-based column of a failure from its source line.
fn guess_column(source_line: &str) -> Option<usize> {
    let byte_offset = ASSERTION_CALLS
        .iter()
        .find_map(|call| source_line.find(call))
        .or_else(|| source_line.find(|c: char| !c.is_whitespace()))?;
    Some(source_line[..byte_offset].chars().count() + 1)
}
