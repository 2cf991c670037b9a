// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by sentinel.

use crate::processor::TestStatus;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error, fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error(
    "failed to parse sentinel config{}",
    .config_file.as_ref().map(|path| format!(" at `{path}`")).unwrap_or_default()
)]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, err: ConfigError) -> Self {
        Self { config_file, err }
    }

    /// Returns the user config file that was being read, if any.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }
}

/// A structural impossibility in a test event stream.
///
/// Malformed lines are never reported through this type: they are counted and skipped.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProcessingError {
    /// A terminal action arrived for a test that was never seen.
    #[error("received `{action}` for unknown test `{test}` in package `{package}`")]
    UnknownTest {
        /// The package.
        package: String,
        /// The full test name.
        test: String,
        /// The action that referenced the test.
        action: String,
    },

    /// A second terminal action arrived for a test that had already finished.
    #[error("test `{test}` in package `{package}` already finished with status `{status}`")]
    AlreadyFinished {
        /// The package.
        package: String,
        /// The full test name.
        test: String,
        /// The status recorded by the first terminal action.
        status: TestStatus,
    },
}

/// An error returned by a [`ProcessLauncher`](crate::runner::ProcessLauncher) that could not
/// start a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// The test process could not be spawned.
    #[error("failed to spawn `{command}`")]
    Spawn {
        /// The command line that was being spawned.
        command: String,
        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// Some other launcher-specific failure.
    #[error("{message}")]
    Other {
        /// A description of the failure.
        message: String,
    },
}

impl LaunchError {
    /// Creates a new `Spawn` error.
    pub fn spawn(command: impl Into<String>, err: io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            err,
        }
    }

    /// Creates a new `Other` error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Displays an error along with its chain of sources, separated by `: `.
pub(crate) struct DisplayErrorChain<E>(E);

impl<E: error::Error> DisplayErrorChain<E> {
    pub(crate) fn new(err: E) -> Self {
        Self(err)
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
