// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "subtest" if `count` is 1, otherwise "subtests".
    pub(crate) fn subtests_str(count: usize) -> &'static str {
        if count == 1 { "subtest" } else { "subtests" }
    }

    /// Returns "package" if `count` is 1, otherwise "packages".
    pub(crate) fn packages_str(count: usize) -> &'static str {
        if count == 1 { "package" } else { "packages" }
    }
}

/// Splits a `/`-delimited test name into its parent name and its leaf segment.
///
/// Returns `None` for the parent if the name has no `/`.
pub(crate) fn split_test_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('/') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, name),
    }
}
