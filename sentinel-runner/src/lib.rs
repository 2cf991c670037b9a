// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core engine for go-sentinel.
//!
//! This crate turns the output of `go test -json` into a structured result tree
//! ([`processor`]), coalesces noisy file-change notifications into well-timed re-run triggers
//! ([`watch`]), and glues the two together with an external process launcher and renderer
//! ([`runner`]).
//!
//! Spawning `go test`, watching the file system and drawing results on screen are left to the
//! caller; see the traits in [`runner`].

pub mod config;
pub mod errors;
mod helpers;
pub mod processor;
pub mod runner;
mod time;
pub mod watch;
