// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing a single line of `go test -json` output.
///
/// The line is kept around so that callers can report it; a malformed line is
/// usually interleaved compiler or linker output rather than a real event.
#[derive(Debug)]
pub struct EventParseError {
    line: String,
    err: serde_json::Error,
}

impl EventParseError {
    pub(crate) fn new(line: impl Into<String>, err: serde_json::Error) -> Self {
        Self {
            line: line.into(),
            err,
        }
    }

    /// Returns the line that failed to parse.
    pub fn line(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to parse test event from line `{}`", self.line)
    }
}

impl error::Error for EventParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}
