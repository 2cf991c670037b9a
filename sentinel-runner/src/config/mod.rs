// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for runs and the watch loop.
//!
//! Configuration is layered: the defaults embedded in [`SentinelConfig::DEFAULT_CONFIG`] come
//! first, then an optional TOML file, then environment variables prefixed with
//! `SENTINEL_` (nested keys separated by `__`, e.g. `SENTINEL_WATCH__DEBOUNCE=500ms`).

mod elements;
mod imp;

pub use elements::*;
pub use imp::*;
