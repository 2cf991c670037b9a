// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure, eyre};
use indoc::indoc;
use pretty_assertions::assert_eq;
use sentinel_runner::processor::{
    ErrorKind, EventStreamProcessor, PackageStatus, SourceLocation, TestStatus,
};
use std::time::Duration;

fn process(output: &str) -> EventStreamProcessor {
    let mut processor = EventStreamProcessor::new();
    for line in output.lines() {
        // Anomalies are counted in the summary.
        _ = processor.feed_line(line);
    }
    processor
}

#[test]
fn mixed_run() -> Result<()> {
    test_init();

    let summary = process(MIXED_RUN).finalize();

    let names: Vec<_> = summary.packages().iter().map(|p| p.name()).collect();
    assert_eq!(
        names,
        vec!["example.com/calc", "example.com/strs", "example.com/empty"]
    );
    assert_eq!(summary.malformed_lines(), 1);
    assert_eq!(summary.anomalies(), 0);
    assert_eq!(summary.total_tests(), 3);
    assert_eq!(summary.passed_tests(), 2);
    assert_eq!(summary.failed_tests(), 1);
    assert_eq!(summary.failed_packages(), vec!["example.com/strs"]);
    assert!(!summary.is_success());

    let calc = summary
        .package("example.com/calc")
        .ok_or_else(|| eyre!("calc package is missing"))?;
    assert!(calc.success());
    assert_eq!(calc.duration(), Duration::from_millis(250));
    assert_eq!(calc.raw_output(), "ok  \texample.com/calc\t0.250s\n");
    let add = calc
        .find("TestAdd")
        .ok_or_else(|| eyre!("TestAdd is missing"))?;
    assert_eq!(add.duration(), Duration::from_millis(125));
    let children: Vec<_> = calc.children(add).map(|c| c.leaf_name()).collect();
    assert_eq!(children, vec!["negative"]);

    let strs = summary
        .package("example.com/strs")
        .ok_or_else(|| eyre!("strs package is missing"))?;
    assert_eq!(*strs.status(), PackageStatus::Failed);
    let reverse = strs
        .find("TestReverse")
        .ok_or_else(|| eyre!("TestReverse is missing"))?;
    assert_eq!(reverse.status(), TestStatus::Failed);
    assert_eq!(
        reverse.output().lines(),
        &[
            "=== RUN   TestReverse",
            "    strs_test.go:4: Reverse(\"ab\") = \"ab\"; want \"ba\"",
            "--- FAIL: TestReverse (0.00s)",
        ]
    );
    let error = reverse
        .error()
        .ok_or_else(|| eyre!("TestReverse has no error detail"))?;
    assert_eq!(error.kind, ErrorKind::Assertion);
    assert_eq!(error.expected.as_deref(), Some("\"ba\""));
    assert_eq!(error.actual.as_deref(), Some("\"ab\""));
    assert_eq!(
        error.location,
        Some(SourceLocation {
            file: "strs_test.go".to_owned(),
            line: 4,
            column: None,
        })
    );

    let empty = summary
        .package("example.com/empty")
        .ok_or_else(|| eyre!("empty package is missing"))?;
    ensure!(empty.success(), "a package without tests passes");
    assert_eq!(empty.test_count(), 0);

    let (first, last) = summary
        .event_span()
        .ok_or_else(|| eyre!("events carried timestamps"))?;
    assert_eq!((last - first).num_milliseconds(), 600);

    Ok(())
}

#[test]
fn snapshots_during_a_run() {
    test_init();

    let mut processor = EventStreamProcessor::new();
    let lines: Vec<_> = MIXED_RUN.lines().collect();
    // Stop just after TestAdd/negative passed.
    for line in &lines[..5] {
        _ = processor.feed_line(line);
    }

    let snapshot = processor.snapshot();
    assert!(!snapshot.is_finalized());
    let calc = snapshot.package("example.com/calc").expect("calc exists");
    assert!(!calc.success(), "a package still running isn't a success");
    let counts = calc.counts();
    assert_eq!((counts.total, counts.passed, counts.unfinished), (2, 1, 1));

    // Taking a snapshot doesn't disturb the processor.
    for line in &lines[5..] {
        _ = processor.feed_line(line);
    }
    assert_eq!(processor.finalize().total_tests(), 3);
}

#[test]
fn interleaved_parallel_subtests() {
    test_init();

    // t.Parallel() subtests pause and continue, and their parent's terminal event arrives after
    // all of them.
    let summary = process(indoc! {r#"
        {"Action":"run","Package":"p","Test":"TestTable"}
        {"Action":"run","Package":"p","Test":"TestTable/a"}
        {"Action":"pause","Package":"p","Test":"TestTable/a"}
        {"Action":"run","Package":"p","Test":"TestTable/b"}
        {"Action":"pause","Package":"p","Test":"TestTable/b"}
        {"Action":"cont","Package":"p","Test":"TestTable/a"}
        {"Action":"cont","Package":"p","Test":"TestTable/b"}
        {"Action":"output","Package":"p","Test":"TestTable/b","Output":"    table_test.go:20: got 1, want 2\n"}
        {"Action":"fail","Package":"p","Test":"TestTable/b","Elapsed":0.01}
        {"Action":"skip","Package":"p","Test":"TestTable/a","Elapsed":0}
        {"Action":"fail","Package":"p","Test":"TestTable","Elapsed":0.02}
        {"Action":"fail","Package":"p","Elapsed":0.03}
    "#})
    .finalize();

    let package = summary.package("p").expect("package exists");
    let table = package.find("TestTable").expect("parent exists");
    assert_eq!(table.status(), TestStatus::Failed);
    assert_eq!(
        table.error().map(|e| (e.kind, e.message.as_str())),
        Some((ErrorKind::SubtestFailure, "failed due to 1 failed subtest"))
    );
    let statuses: Vec<_> = package
        .children(table)
        .map(|c| (c.leaf_name(), c.status()))
        .collect();
    assert_eq!(
        statuses,
        vec![("a", TestStatus::Skipped), ("b", TestStatus::Failed)]
    );
    assert_eq!(package.skipped_count(), 1);
    assert_eq!(package.failed_count(), 2);
}

#[test]
fn truncated_stream() {
    test_init();

    // The process died after starting a test: no terminal events at all.
    let summary = process(indoc! {r#"
        {"Action":"run","Package":"p","Test":"TestHang"}
        {"Action":"run","Package":"p","Test":"TestHang/inner"}
        {"Action":"output","Package":"p","Test":"TestHang/inner","Output":"waiting for lock"}
    "#})
    .finalize();

    let package = summary.package("p").expect("package exists");
    assert_eq!(*package.status(), PackageStatus::Failed);
    for name in ["TestHang", "TestHang/inner"] {
        let test = package.find(name).expect("test exists");
        assert_eq!(test.status(), TestStatus::Error, "{name}");
        assert_eq!(test.error().map(|e| e.kind), Some(ErrorKind::Unfinished));
    }
    let inner = package.find("TestHang/inner").expect("test exists");
    assert_eq!(inner.output().lines(), &["waiting for lock"]);
}
