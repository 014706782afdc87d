// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP report reconciliation.
//!
//! Reports address datagrams by their dense send index. A run of lost
//! reports is coalesced into a single `DROPPED` report at the first index
//! after the gap, so drop detection only checks that every gap boundary is
//! flagged and nothing else is.

use log::{debug, trace};

use crate::capture::{check_timestamps, check_udp_indices, UdpDatagram};
use crate::clock::ClockOffset;
use crate::config::ReconcileConfig;
use crate::error::{CoverageError, MismatchKind, ReconcileError};
use crate::order::{check_report_order, Transport};
use crate::report::{ReportFlags, TimestampReport};
use crate::stats::UdpStats;

/// Reconcile a UDP report sequence against the datagrams sent.
///
/// `datagrams` must hold every datagram sent, indexed 0, 1, 2, ... in order.
pub fn reconcile_udp(
    reports: &[TimestampReport],
    datagrams: &[UdpDatagram],
    clock_offset: ClockOffset,
    config: &ReconcileConfig,
) -> Result<UdpStats, ReconcileError> {
    config.validate()?;
    check_udp_indices(datagrams)?;
    check_timestamps(datagrams.iter().map(|d| &d.timestamp))?;
    check_report_order(reports, Transport::Udp)?;

    let total_sent = datagrams.len();
    let tolerance_ns = config.tolerance_ns();
    let mut stats = UdpStats::default();
    let mut prev_start: Option<u32> = None;

    debug!(
        "[udp] reconciling {} reports against {} datagrams (offset {})",
        reports.len(),
        total_sent,
        clock_offset
    );

    for (index, report) in reports.iter().enumerate() {
        let Some(dgram) = datagrams.get(report.start as usize) else {
            return Err(CoverageError::ReportBeyondCapture {
                start: report.start,
                sent: total_sent,
            }
            .into());
        };
        let packet = report.start as usize;
        let mismatch = |kind| ReconcileError::Mismatch {
            report: index,
            packet,
            kind,
        };

        // Datagrams strictly between the previous report and this one
        let gap = match prev_start {
            Some(prev) => report.start - prev - 1,
            None => report.start,
        };

        if report.flags.intersects(ReportFlags::TCP_ONLY) {
            return Err(mismatch(MismatchKind::TcpFlagsOnUdp {
                flags: report.flags,
            }));
        }

        let mut expected = config.clock_flags;
        if gap > 0 {
            expected |= ReportFlags::DROPPED;
        }
        if report.flags != expected {
            return Err(mismatch(MismatchKind::Flags {
                expected,
                actual: report.flags,
            }));
        }

        if report.bytes != dgram.payload_len {
            return Err(mismatch(MismatchKind::Length {
                expected: dgram.payload_len,
                actual: report.bytes,
            }));
        }

        let deviation_ns = clock_offset
            .apply(report.timestamp)
            .nanos_since(&dgram.timestamp);
        if deviation_ns.unsigned_abs() > tolerance_ns {
            return Err(mismatch(MismatchKind::Timestamp {
                deviation_ns,
                tolerance_ns,
            }));
        }

        stats.matched += 1;
        stats.max_deviation_ns = stats.max_deviation_ns.max(deviation_ns.unsigned_abs());
        if gap > 0 {
            stats.dropped_reports += 1;
            stats.lost_packets += u64::from(gap);
            debug!(
                "[udp] report #{} (index {}) closes a gap of {}",
                index, report.start, gap
            );
        }
        trace!(
            "[udp] report #{} matched datagram {} (len={} dev={}ns)",
            index,
            report.start,
            report.bytes,
            deviation_ns
        );
        prev_start = Some(report.start);
    }

    if total_sent > 0 {
        let expected = total_sent - 1;
        if prev_start.map(|s| s as usize) != Some(expected) {
            return Err(CoverageError::Incomplete {
                last: prev_start,
                expected,
            }
            .into());
        }
    }

    debug!("[udp] reconciled: {}", stats);
    Ok(stats)
}
