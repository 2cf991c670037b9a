// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coalescing of file-change notifications into re-run triggers.
//!
//! Mapping changed paths to packages is the file watcher's job; this module only sees package
//! keys.

mod debouncer;

pub use debouncer::*;
