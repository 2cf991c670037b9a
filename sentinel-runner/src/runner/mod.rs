// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driving runs: launching `go test`, feeding its output to a processor and handing the results
//! to a renderer.
//!
//! The process launcher and the renderer are supplied by the caller through the
//! [`ProcessLauncher`] and [`Renderer`] traits.

mod coordinator;
mod launcher;

pub use coordinator::*;
pub use launcher::*;
