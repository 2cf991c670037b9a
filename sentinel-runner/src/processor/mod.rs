// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a `go test -json` event stream into a tree of results.
//!
//! The entry point is [`EventStreamProcessor`]. Each run gets its own processor; events are fed
//! in the order `go test` produced them, and [`EventStreamProcessor::finalize`] produces the
//! read-only [`RunSummary`] once the stream ends.

mod annotation;
mod imp;
mod summary;
mod tree;

pub use annotation::{ErrorDetail, ErrorKind, SourceContext, SourceLocation};
pub use imp::*;
pub use summary::*;
pub use tree::*;
