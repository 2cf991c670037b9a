// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::LaunchError, helpers::plural, processor::RunSummary};
use camino::Utf8PathBuf;
use std::{collections::BTreeSet, fmt, future::Future};
use tokio::{io::AsyncBufRead, sync::oneshot};

/// The packages a run should cover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunRequest {
    /// Every package in the module.
    All,
    /// Only these packages. An empty set means every package.
    Packages(BTreeSet<String>),
}

impl RunRequest {
    /// Creates a request for the given packages, or for every package if there are none.
    pub fn packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages: BTreeSet<String> = packages.into_iter().map(Into::into).collect();
        if packages.is_empty() {
            Self::All
        } else {
            Self::Packages(packages)
        }
    }

    /// Returns true if this request covers every package.
    pub fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::Packages(packages) => packages.is_empty(),
        }
    }
}

impl fmt::Display for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packages(packages) if !packages.is_empty() => {
                write!(f, "{} {}", packages.len(), plural::packages_str(packages.len()))
            }
            _ => write!(f, "all packages"),
        }
    }
}

/// A package that failed to build.
///
/// A package that doesn't compile produces no JSON events, so launchers report these
/// separately from the event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildFailure {
    /// The package path.
    pub package: String,
    /// The compiler output.
    pub message: String,
}

impl BuildFailure {
    /// Creates a new build failure.
    pub fn new(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            message: message.into(),
        }
    }
}

/// A run started by a [`ProcessLauncher`].
pub struct LaunchedRun {
    /// The `go test -json` output, one event per line.
    pub lines: Box<dyn AsyncBufRead + Send + Unpin>,

    /// Build failures, sent once the process has exited.
    ///
    /// If the sender is dropped without sending, no build failures are recorded.
    pub build_failures: Option<oneshot::Receiver<Vec<BuildFailure>>>,
}

impl LaunchedRun {
    /// Creates a run that reads events from `lines` and reports no build failures.
    pub fn new(lines: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            lines: Box::new(lines),
            build_failures: None,
        }
    }

    /// Sets the channel on which build failures are reported.
    pub fn with_build_failures(mut self, receiver: oneshot::Receiver<Vec<BuildFailure>>) -> Self {
        self.build_failures = Some(receiver);
        self
    }
}

impl fmt::Debug for LaunchedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedRun")
            .field("build_failures", &self.build_failures.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts `go test -json` processes.
///
/// Spawning, environment and process lifetime are entirely the launcher's concern; the
/// coordinator only reads the line stream it returns.
pub trait ProcessLauncher {
    /// Starts a run covering `request`.
    fn launch(
        &self,
        request: &RunRequest,
    ) -> impl Future<Output = Result<LaunchedRun, LaunchError>> + Send;

    /// Returns the directory containing `package`'s sources, if known.
    ///
    /// Used to show source lines around failures. The default returns `None`.
    fn package_dir(&self, package: &str) -> Option<Utf8PathBuf> {
        _ = package;
        None
    }
}

/// Displays results.
pub trait Renderer {
    /// Called with partial results while a run is in progress, at most once per configured
    /// progress interval. The default does nothing.
    fn render_progress(&mut self, summary: &RunSummary) {
        _ = summary;
    }

    /// Called once with the final results of each run.
    fn render_summary(&mut self, summary: &RunSummary);
}
