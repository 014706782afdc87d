// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trace bundle persistence and offline replay.

use std::io::Write;

use tempfile::{tempdir, NamedTempFile};
use txstamp::{
    ClockOffset, CoverageError, RawReport, ReconcileConfig, ReconcileError, ReportFlags,
    SourceError, TcpSegment, Timespec, TimestampReport, TraceBundle, TraceVerdict,
};

const BASE: ReportFlags = ReportFlags::CLOCK_SET.with(ReportFlags::CLOCK_IN_SYNC);

fn tcp_bundle(with_fin: bool) -> TraceBundle {
    let isn = 5000;
    // Reporting host clock is 250 ms ahead of the capture host
    let rts = |ms: i64| Timespec::from_millis(ms + 250);
    let cts = Timespec::from_millis;

    let mut reports = vec![
        TimestampReport::new(0, 0, rts(10), BASE | ReportFlags::TCP_SYN),
        TimestampReport::new(0, 1448, rts(20), BASE),
        TimestampReport::new(1448, 552, rts(21), BASE),
    ];
    let mut capture = vec![
        TcpSegment::syn(isn, cts(10)),
        TcpSegment::data(isn + 1, 1448, cts(20)),
        TcpSegment::data(isn + 1 + 1448, 552, cts(21)),
    ];
    if with_fin {
        reports.push(TimestampReport::new(2000, 0, rts(30), BASE | ReportFlags::TCP_FIN));
        capture.push(TcpSegment::fin(isn + 1 + 2000, 0, cts(30)));
    }

    TraceBundle::Tcp {
        clock_offset_ms: 250,
        reports: reports.into_iter().map(RawReport::from).collect(),
        capture,
    }
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("run.json");

    let bundle = tcp_bundle(true);
    bundle.save(&path).expect("save");
    let loaded = TraceBundle::load(&path).expect("load");

    assert_eq!(loaded, bundle);
    assert_eq!(loaded.transport(), "tcp");
    assert_eq!(loaded.clock_offset(), ClockOffset::from_millis(250));
}

#[test]
fn test_replay_loaded_bundle() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("run.json");
    tcp_bundle(true).save(&path).expect("save");

    let verdict = TraceBundle::load(&path)
        .expect("load")
        .reconcile(&ReconcileConfig::new())
        .expect("reconcile");

    match verdict {
        TraceVerdict::Tcp(stats) => {
            assert_eq!(stats.matched, 4);
            assert_eq!(stats.max_deviation_ns, 0);
        }
        other => panic!("unexpected verdict {other}"),
    }
}

#[test]
fn test_replay_open_connection() {
    let bundle = tcp_bundle(false);

    let err = bundle
        .reconcile(&ReconcileConfig::new())
        .expect_err("FIN required by default");
    assert!(matches!(err, ReconcileError::Coverage(CoverageError::NoFin)));

    let verdict = bundle
        .reconcile(&ReconcileConfig::open_connection())
        .expect("open connection accepted");
    assert_eq!(verdict.drop_count(), 0);
}

#[test]
fn test_handwritten_udp_bundle() {
    let mut file = NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"{{
            "transport": "udp",
            "clock_offset_ms": -5,
            "reports": [
                {{"start": 0, "bytes": 32, "timestamp": {{"sec": 9, "nsec": 995000000}}, "flags": 3}},
                {{"start": 2, "bytes": 32, "timestamp": {{"sec": 9, "nsec": 995000000}}, "flags": 7}}
            ],
            "capture": [
                {{"index": 0, "payload_len": 32, "timestamp": {{"sec": 10, "nsec": 0}}}},
                {{"index": 1, "payload_len": 32, "timestamp": {{"sec": 10, "nsec": 0}}}},
                {{"index": 2, "payload_len": 32, "timestamp": {{"sec": 10, "nsec": 0}}}}
            ]
        }}"#
    )
    .expect("write bundle");

    let bundle = TraceBundle::load(file.path()).expect("load");
    let verdict = bundle.reconcile(&ReconcileConfig::new()).expect("reconcile");
    match verdict {
        TraceVerdict::Udp(stats) => {
            assert_eq!(stats.drop_count(), 1);
            assert_eq!(stats.lost_packets, 1);
        }
        other => panic!("unexpected verdict {other}"),
    }
}

#[test]
fn test_malformed_capture_timestamp() {
    let mut file = NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"{{"transport": "udp",
            "reports": [{{"start": 0, "bytes": 1, "timestamp": {{"sec": 1, "nsec": 0}}, "flags": 3}}],
            "capture": [{{"index": 0, "payload_len": 1, "timestamp": {{"sec": 1, "nsec": 2000000000}}}}]}}"#
    )
    .expect("write bundle");

    let bundle = TraceBundle::load(file.path()).expect("load");
    let err = bundle
        .reconcile(&ReconcileConfig::new())
        .expect_err("nsec out of range");
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::MalformedTimestamp { index: 0, .. })
    ));
    assert!(err.is_operational());
}

#[test]
fn test_load_errors() {
    let dir = tempdir().expect("tempdir");
    assert!(matches!(
        TraceBundle::load(dir.path().join("missing.json")),
        Err(SourceError::Io(_))
    ));

    let mut file = NamedTempFile::new().expect("tempfile");
    write!(file, "{{ not json").expect("write");
    assert!(matches!(
        TraceBundle::load(file.path()),
        Err(SourceError::Json(_))
    ));
}
