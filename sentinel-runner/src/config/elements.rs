// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Deserialize;
use std::{fmt, time::Duration};

/// Configuration for watch mode.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct WatchConfig {
    /// The quiet period that must follow the last change to a package before it is re-run.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Which packages to run when a change is detected.
    pub mode: WatchMode,

    /// Whether to run every package once before waiting for changes.
    pub run_on_start: bool,
}

/// Configuration for a single run.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The minimum time between two progress snapshots handed to the renderer.
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,

    /// The number of source lines shown on either side of a failure location.
    pub source_context_lines: usize,
}

/// Which packages watch mode re-runs after a change.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    /// Run only the packages that changed.
    Changed,

    /// Run every package.
    All,
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => write!(f, "changed"),
            Self::All => write!(f, "all"),
        }
    }
}
