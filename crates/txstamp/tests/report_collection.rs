// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Report draining against well-behaved and faulty sources.

use txstamp::{
    drain, DrainConfig, MemorySource, RawReport, RawTimespec, ReconcileError, ReportSource,
    SourceError,
};

fn raw(start: u32) -> RawReport {
    RawReport {
        start,
        bytes: 10,
        timestamp: RawTimespec {
            sec: 1,
            nsec: i64::from(start) * 1000,
        },
        flags: 3,
    }
}

fn records(n: u32) -> Vec<RawReport> {
    (0..n).map(raw).collect()
}

/// Records every requested batch size.
struct Recording {
    inner: MemorySource,
    requests: Vec<usize>,
}

impl ReportSource for Recording {
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError> {
        self.requests.push(max);
        self.inner.fetch(max)
    }
}

/// Fails on the given call.
struct Failing {
    inner: MemorySource,
    fail_on: usize,
    calls: usize,
}

impl ReportSource for Failing {
    fn fetch(&mut self, max: usize) -> Result<Vec<RawReport>, SourceError> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(SourceError::failed("ring buffer read failed"));
        }
        self.inner.fetch(max)
    }
}

/// Ignores the requested size.
struct Greedy(Vec<RawReport>);

impl ReportSource for Greedy {
    fn fetch(&mut self, _max: usize) -> Result<Vec<RawReport>, SourceError> {
        Ok(std::mem::take(&mut self.0))
    }
}

#[test]
fn test_drain_preserves_order() {
    let mut source = MemorySource::new(records(100));
    let reports = drain(&mut source, &DrainConfig::new(1, 7).with_seed(9)).expect("drain");

    assert_eq!(reports.len(), 100);
    assert!(reports.windows(2).all(|w| w[0].start + 1 == w[1].start));
    assert_eq!(source.pending(), 0);
}

#[test]
fn test_batch_sizes_within_bounds_and_seeded() {
    let run = |seed| {
        let mut source = Recording {
            inner: MemorySource::new(records(200)),
            requests: Vec::new(),
        };
        drain(&mut source, &DrainConfig::new(3, 11).with_seed(seed)).expect("drain");
        source.requests
    };

    let first = run(1234);
    assert!(first.iter().all(|n| (3..=11).contains(n)));
    assert_eq!(first, run(1234));
    assert_ne!(first, run(4321));
}

#[test]
fn test_single_call_takes_one_snapshot() {
    let mut source = MemorySource::new(records(50));
    let reports = drain(&mut source, &DrainConfig::fixed(8).single_call()).expect("drain");

    assert_eq!(reports.len(), 8);
    assert_eq!(source.calls(), 1);
    assert_eq!(source.pending(), 42);
}

#[test]
fn test_single_call_on_empty_source() {
    let mut source = MemorySource::default();
    let reports = drain(&mut source, &DrainConfig::fixed(8).single_call()).expect("drain");
    assert!(reports.is_empty());
}

#[test]
fn test_second_drain_of_exhausted_source_is_empty() {
    let mut source = MemorySource::new(records(10));
    let config = DrainConfig::new(2, 5);

    assert_eq!(drain(&mut source, &config).expect("first drain").len(), 10);
    assert!(drain(&mut source, &config).expect("second drain").is_empty());

    // New traffic shows up on the next drain
    source.push(raw(10));
    let third = drain(&mut source, &config).expect("third drain");
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].start, 10);
}

#[test]
fn test_source_failure_discards_everything() {
    let mut source = Failing {
        inner: MemorySource::new(records(20)),
        fail_on: 3,
        calls: 0,
    };

    let err = drain(&mut source, &DrainConfig::fixed(4)).expect_err("third call fails");
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::Failed(ref msg)) if msg.contains("ring buffer")
    ));
}

#[test]
fn test_oversized_batch_rejected() {
    let mut source = Greedy(records(10));

    let err = drain(&mut source, &DrainConfig::fixed(4)).expect_err("too many records");
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::Oversized {
            requested: 4,
            returned: 10
        })
    ));
}

#[test]
fn test_invalid_batch_range() {
    let mut source = MemorySource::new(records(1));

    assert!(matches!(
        drain(&mut source, &DrainConfig::new(0, 4)),
        Err(ReconcileError::Config(_))
    ));
    assert!(matches!(
        drain(&mut source, &DrainConfig::new(8, 4)),
        Err(ReconcileError::Config(_))
    ));
    // Nothing was fetched
    assert_eq!(source.calls(), 0);
}

#[test]
fn test_malformed_record_aborts() {
    let mut recs = records(6);
    recs[4].timestamp.nsec = 1_000_000_000;
    let mut source = MemorySource::new(recs);

    let err = drain(&mut source, &DrainConfig::fixed(2)).expect_err("bad nsec");
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::MalformedTimestamp { index: 4, .. })
    ));
}

#[test]
fn test_boxed_dyn_source() {
    let mut source: Box<dyn ReportSource> = Box::new(MemorySource::new(records(5)));
    let reports = drain(&mut source, &DrainConfig::default()).expect("drain");
    assert_eq!(reports.len(), 5);
}
