// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use tokio::time::Instant;

/// Roughly 30 years: the stand-in for "never" when a deadline can't be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Returns `start + interval`, saturating to a far-future instant instead of overflowing.
///
/// Intervals come from configuration and can be arbitrarily large (`500000000000y` parses).
pub(crate) fn deadline_after(start: Instant, interval: Duration) -> Instant {
    start
        .checked_add(interval)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
