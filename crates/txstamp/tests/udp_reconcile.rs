// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP reconciliation scenarios.

use std::time::Duration;

use txstamp::{
    reconcile_udp, ClockOffset, CoverageError, MismatchKind, ProtocolViolation, ReconcileConfig,
    ReconcileError, ReportFlags, SourceError, Timespec, TimestampReport, UdpDatagram,
};

const BASE: ReportFlags = ReportFlags::CLOCK_SET.with(ReportFlags::CLOCK_IN_SYNC);
const DROPPED: ReportFlags = ReportFlags::DROPPED;

/// Datagram `i` is 64 + i bytes, captured at 100 ms + 10 ms * i.
fn sent(n: u32) -> Vec<UdpDatagram> {
    (0..n)
        .map(|i| UdpDatagram::new(i, 64 + i, at(i)))
        .collect()
}

fn at(i: u32) -> Timespec {
    Timespec::from_millis(100 + 10 * i64::from(i))
}

fn rep(index: u32, flags: ReportFlags) -> TimestampReport {
    TimestampReport::new(index, 64 + index, at(index), flags)
}

fn run(reports: &[TimestampReport], datagrams: &[UdpDatagram]) -> Result<txstamp::UdpStats, ReconcileError> {
    reconcile_udp(reports, datagrams, ClockOffset::ZERO, &ReconcileConfig::new())
}

#[test]
fn test_all_reports_present() {
    let reports: Vec<_> = (0..5).map(|i| rep(i, BASE)).collect();

    let stats = run(&reports, &sent(5)).expect("complete");
    assert_eq!(stats.matched, 5);
    assert_eq!(stats.drop_count(), 0);
    assert_eq!(stats.lost_packets, 0);
}

#[test]
fn test_gaps_flagged() {
    let reports = [
        rep(1, BASE | DROPPED),
        rep(2, BASE),
        rep(6, BASE | DROPPED),
        rep(7, BASE),
    ];

    let stats = run(&reports, &sent(8)).expect("gaps flagged");
    assert_eq!(stats.drop_count(), 2);
    assert_eq!(stats.lost_packets, 1 + 3);
}

#[test]
fn test_gap_without_dropped_flag() {
    let reports = [rep(0, BASE), rep(2, BASE)];

    let err = run(&reports, &sent(3)).expect_err("gap not flagged");
    assert!(matches!(
        err,
        ReconcileError::Mismatch {
            report: 1,
            packet: 2,
            kind: MismatchKind::Flags { .. }
        }
    ));
}

#[test]
fn test_dropped_flag_without_gap() {
    let reports = [rep(0, BASE), rep(1, BASE | DROPPED)];

    let err = run(&reports, &sent(2)).expect_err("spurious DROPPED");
    assert_eq!(
        err.mismatch_kind(),
        Some(&MismatchKind::Flags {
            expected: BASE,
            actual: BASE | DROPPED
        })
    );
}

#[test]
fn test_tcp_flags_rejected() {
    let reports = [rep(0, BASE | ReportFlags::TCP_RETRANS)];

    let err = run(&reports, &sent(1)).expect_err("TCP flag on UDP");
    assert!(matches!(
        err.mismatch_kind(),
        Some(MismatchKind::TcpFlagsOnUdp { .. })
    ));
}

#[test]
fn test_tail_missing_is_incomplete() {
    let reports = [rep(0, BASE), rep(1, BASE), rep(2, BASE)];

    let err = run(&reports, &sent(5)).expect_err("last reports missing");
    assert!(matches!(
        err,
        ReconcileError::Coverage(CoverageError::Incomplete {
            last: Some(2),
            expected: 4
        })
    ));
}

#[test]
fn test_report_beyond_capture() {
    let reports = [rep(0, BASE), rep(3, BASE | DROPPED)];

    let err = run(&reports, &sent(3)).expect_err("index 3 never sent");
    assert!(matches!(
        err,
        ReconcileError::Coverage(CoverageError::ReportBeyondCapture { start: 3, sent: 3 })
    ));
}

#[test]
fn test_repeated_index_is_protocol_violation() {
    let reports = [rep(0, BASE), rep(1, BASE), rep(1, BASE)];

    let err = run(&reports, &sent(2)).expect_err("duplicate report");
    assert!(matches!(
        err,
        ReconcileError::Protocol {
            index: 2,
            violation: ProtocolViolation::StartNotIncreasing { prev: 1, next: 1 }
        }
    ));
}

#[test]
fn test_length_and_timestamp_checked() {
    let mut short = rep(0, BASE);
    short.bytes = 1;
    let err = run(&[short], &sent(1)).expect_err("length");
    assert!(matches!(
        err.mismatch_kind(),
        Some(MismatchKind::Length {
            expected: 64,
            actual: 1
        })
    ));

    let mut late = rep(0, BASE);
    late.timestamp = Timespec::from_millis(100 + 600);
    let err = run(&[late], &sent(1)).expect_err("timestamp");
    assert!(matches!(
        err.mismatch_kind(),
        Some(MismatchKind::Timestamp { .. })
    ));

    let relaxed = ReconcileConfig::new().with_tolerance(Duration::from_secs(1));
    let stats = reconcile_udp(&[late], &sent(1), ClockOffset::ZERO, &relaxed)
        .expect("within relaxed tolerance");
    assert_eq!(stats.max_deviation_ns, 600_000_000);
}

#[test]
fn test_unsynchronized_clock_flags() {
    let config = ReconcileConfig::new().with_clock_flags(ReportFlags::CLOCK_SET);
    let reports = [rep(0, ReportFlags::CLOCK_SET), rep(1, ReportFlags::CLOCK_SET)];

    let stats =
        reconcile_udp(&reports, &sent(2), ClockOffset::ZERO, &config).expect("clock not in sync");
    assert_eq!(stats.matched, 2);

    let err = run(&reports, &sent(2)).expect_err("default expects CLOCK_IN_SYNC");
    assert!(err.is_mismatch());
}

#[test]
fn test_capture_must_be_dense() {
    let mut datagrams = sent(3);
    datagrams.swap(1, 2);
    let reports: Vec<_> = (0..3).map(|i| rep(i, BASE)).collect();

    let err = run(&reports, &datagrams).expect_err("capture out of order");
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::CaptureOutOfOrder { position: 1, index: 2 })
    ));
}
