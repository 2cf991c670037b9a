// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::EventParseError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, time::Duration};

/// A single event from the `go test -json` stream.
///
/// Field names on the wire follow Go's `test2json` conventions (`Time`,
/// `Action`, `Package`, `Test`, `Output`, `Elapsed`). Every field other than
/// `Action` may be missing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    /// The time at which the event was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<FixedOffset>>,

    /// What happened.
    pub action: TestAction,

    /// The package (owning unit) the event belongs to.
    #[serde(default)]
    pub package: String,

    /// The test name, or the empty string for package-level events.
    ///
    /// Subtests are named with `/`-delimited paths, e.g. `TestParent/Child`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test: String,

    /// A fragment of output. Only meaningful for [`TestAction::Output`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Seconds elapsed, reported on terminal actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
}

impl TestEvent {
    /// Creates a new event with no timestamp, output or elapsed time.
    pub fn new(action: TestAction, package: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            time: None,
            action,
            package: package.into(),
            test: test.into(),
            output: String::new(),
            elapsed: None,
        }
    }

    /// Sets the output fragment.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets the elapsed time, in seconds.
    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Sets the timestamp.
    pub fn with_time(mut self, time: DateTime<FixedOffset>) -> Self {
        self.time = Some(time);
        self
    }

    /// Parses a single line of `go test -json` output.
    ///
    /// Blank lines produce `Ok(None)`. Anything that isn't a JSON object of the expected shape
    /// produces an error that carries the line.
    pub fn parse_line(line: &str) -> Result<Option<Self>, EventParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|err| EventParseError::new(line, err))
    }

    /// Returns true if this event is about the package as a whole rather than a test.
    #[inline]
    pub fn is_package_level(&self) -> bool {
        self.test.is_empty()
    }

    /// Returns true if this event ends a test or package.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.action.is_terminal()
    }

    /// Returns the elapsed time as a [`Duration`], if one was reported.
    ///
    /// Negative, infinite and NaN values are reported as zero.
    pub fn elapsed_duration(&self) -> Option<Duration> {
        self.elapsed
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or_default())
    }
}

/// The `Action` field of a [`TestEvent`].
///
/// `run`, `pass`, `fail`, `skip` and `output` drive the result tree. The other actions `go test`
/// emits are kept so that they aren't mistaken for malformed input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TestAction {
    /// The package is about to start running.
    Start,
    /// A test started running.
    Run,
    /// A parallel test was paused.
    Pause,
    /// A paused test continued.
    Cont,
    /// The test or package passed.
    Pass,
    /// A benchmark printed its results.
    Bench,
    /// The test or package failed.
    Fail,
    /// Output was produced.
    Output,
    /// The test or package was skipped.
    Skip,
    /// An action this crate doesn't know about.
    Other(String),
}

impl TestAction {
    /// Returns the wire representation of this action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Cont => "cont",
            Self::Pass => "pass",
            Self::Bench => "bench",
            Self::Fail => "fail",
            Self::Output => "output",
            Self::Skip => "skip",
            Self::Other(action) => action,
        }
    }

    /// Returns true for `pass`, `fail` and `skip`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }
}

impl From<&str> for TestAction {
    fn from(s: &str) -> Self {
        match s {
            "start" => Self::Start,
            "run" => Self::Run,
            "pause" => Self::Pause,
            "cont" => Self::Cont,
            "pass" => Self::Pass,
            "bench" => Self::Bench,
            "fail" => Self::Fail,
            "output" => Self::Output,
            "skip" => Self::Skip,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for TestAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TestAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TestAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}
