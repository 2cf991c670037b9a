// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the newline-delimited JSON stream produced by
//! `go test -json`.
//!
//! This crate only describes the wire contract: one [`TestEvent`] per line.
//! Turning a sequence of events into a result tree is the job of
//! `sentinel-runner`.

mod errors;
mod event;

pub use errors::*;
pub use event::*;
