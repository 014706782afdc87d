// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP report reconciliation.
//!
//! A single streaming pass over the capture, in arrival order, against the
//! collected report sequence. Each qualifying segment is either matched with
//! the report under the cursor or, when that report is already ahead of the
//! segment, provisionally skipped as covered by lost reports. The next match
//! must then carry `DROPPED`; a skip run that never reaches its report is an
//! offset mismatch on the first skipped segment.
//!
//! # Connection States
//!
//! ```text
//! Init --SYN--> Established --FIN--> Terminated
//! ```
//!
//! In `Terminated` only repeats of the FIN (same offset) are legal.
//!
//! # Logical Offsets
//!
//! The SYN consumes one sequence number, so the first payload byte sits at
//! `isn + 1`: `offset = seq - isn - 1` (modulo 2^32).

use std::cmp::Ordering;

use log::{debug, trace, warn};

use crate::capture::{check_timestamps, CaptureSource, TcpSegment};
use crate::clock::ClockOffset;
use crate::config::ReconcileConfig;
use crate::error::{CoverageError, MismatchKind, ReconcileError};
use crate::order::{check_report_order, Transport};
use crate::report::{ReportFlags, TimestampReport};
use crate::stats::TcpStats;

/// Start value some stacks put in SYN reports instead of 0.
pub const SYN_START_SENTINEL: u32 = u32::MAX;

/// Connection state as seen by the reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpState {
    /// No SYN captured yet.
    Init,
    /// SYN seen, data and FIN being processed.
    Established,
    /// FIN processed.
    Terminated,
}

/// Ordering key shared by segments and reports. SYN precedes all data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKey {
    Syn,
    Data(u32),
}

impl MatchKey {
    fn of_report(report: &TimestampReport) -> Self {
        if report.flags.contains(ReportFlags::TCP_SYN) {
            MatchKey::Syn
        } else {
            MatchKey::Data(report.start)
        }
    }
}

/// First segment of a pending skip run.
#[derive(Clone, Copy, Debug)]
struct SkipRun {
    packet: usize,
    offset: u32,
    count: u64,
}

/// Streaming TCP reconciliation accumulator.
///
/// Owned by one pass; feed segments with [`TcpReconciler::on_segment`] and
/// close with [`TcpReconciler::finish`]. The first error is terminal.
#[derive(Debug)]
pub struct TcpReconciler<'a> {
    reports: &'a [TimestampReport],
    clock_offset: ClockOffset,
    config: &'a ReconcileConfig,
    cursor: usize,
    packets_seen: usize,
    state: TcpState,
    isn: Option<u32>,
    max_offset: u32,
    max_data_offset: u32,
    fin_offset: Option<u32>,
    skip: Option<SkipRun>,
    sentinel_warned: bool,
    failed_at: Option<usize>,
    stats: TcpStats,
}

impl<'a> TcpReconciler<'a> {
    /// Start a pass over `reports`.
    pub fn new(
        reports: &'a [TimestampReport],
        clock_offset: ClockOffset,
        config: &'a ReconcileConfig,
    ) -> Self {
        Self {
            reports,
            clock_offset,
            config,
            cursor: 0,
            packets_seen: 0,
            state: TcpState::Init,
            isn: None,
            max_offset: 0,
            max_data_offset: 0,
            fin_offset: None,
            skip: None,
            sentinel_warned: false,
            failed_at: None,
            stats: TcpStats::default(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> TcpState {
        self.state
    }

    /// Reports consumed so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &TcpStats {
        &self.stats
    }

    /// `true` once a segment has been rejected.
    pub fn has_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    /// Process one captured segment.
    ///
    /// After the first error every later call fails with
    /// [`ReconcileError::Aborted`].
    pub fn on_segment(&mut self, seg: &TcpSegment) -> Result<(), ReconcileError> {
        if let Some(packet) = self.failed_at {
            return Err(ReconcileError::Aborted { packet });
        }
        let packet = self.packets_seen;
        let result = self.step(seg);
        if result.is_err() {
            self.failed_at = Some(packet);
        }
        result
    }

    fn step(&mut self, seg: &TcpSegment) -> Result<(), ReconcileError> {
        let packet = self.packets_seen;
        self.packets_seen += 1;

        if seg.is_pure_ack() {
            self.stats.filtered_acks += 1;
            trace!("[tcp] packet #{} seq={:#x}: pure ACK, filtered", packet, seg.seq);
            return Ok(());
        }

        let Some(report) = self.reports.get(self.cursor).copied() else {
            return Err(CoverageError::MorePacketsThanReports {
                packet,
                reports: self.reports.len(),
            }
            .into());
        };

        let (offset, syn_repeat) = self.classify(packet, seg)?;
        let expected = self.expected_flags(packet, seg, offset, syn_repeat)?;

        let key = if seg.syn {
            MatchKey::Syn
        } else {
            MatchKey::Data(offset)
        };

        match (key.cmp(&MatchKey::of_report(&report)), self.skip) {
            (Ordering::Less, _) => {
                trace!(
                    "[tcp] packet #{} {:?}: behind report #{} (start={}), skipped",
                    packet,
                    key,
                    self.cursor,
                    report.start
                );
                match &mut self.skip {
                    Some(run) => run.count += 1,
                    None => {
                        self.skip = Some(SkipRun {
                            packet,
                            offset,
                            count: 1,
                        })
                    }
                }
            }
            (Ordering::Greater, Some(run)) => {
                return Err(self.unresolved_skip(run, &report));
            }
            _ => {
                self.check_match(packet, seg, offset, expected, &report)?;
                self.record_match(expected, seg);
            }
        }

        self.advance_bounds(seg, offset);
        Ok(())
    }

    /// Feed every segment of a capture source, stopping at the first error.
    pub fn consume<S>(&mut self, source: &mut S) -> Result<(), ReconcileError>
    where
        S: CaptureSource<TcpSegment> + ?Sized,
    {
        let mut result = Ok(());
        source.subscribe(&mut |seg| {
            if result.is_ok() {
                result = self.on_segment(&seg);
            }
        })?;
        result
    }

    /// Close the pass after the capture ended.
    pub fn finish(self) -> Result<TcpStats, ReconcileError> {
        if let Some(packet) = self.failed_at {
            return Err(ReconcileError::Aborted { packet });
        }
        if let (Some(run), Some(report)) = (self.skip, self.reports.get(self.cursor)) {
            return Err(self.unresolved_skip(run, report));
        }
        if self.cursor != self.reports.len() {
            return Err(CoverageError::LeftoverReports {
                consumed: self.cursor,
                leftover: self.reports.len() - self.cursor,
            }
            .into());
        }
        if self.config.require_fin && self.fin_offset.is_none() {
            return Err(CoverageError::NoFin.into());
        }

        debug!("[tcp] reconciled: {}", self.stats);
        Ok(self.stats)
    }

    /// Validate SYN/ISN consistency and post-FIN traffic.
    ///
    /// Returns the logical offset and whether the segment repeats the SYN.
    fn classify(&mut self, packet: usize, seg: &TcpSegment) -> Result<(u32, bool), ReconcileError> {
        let (offset, syn_repeat) = match (seg.syn, self.isn) {
            (true, None) => {
                self.isn = Some(seg.seq);
                self.state = TcpState::Established;
                trace!("[tcp] packet #{}: SYN, isn={:#x}", packet, seg.seq);
                (0, false)
            }
            (true, Some(isn)) if isn != seg.seq => {
                return Err(self.mismatch(
                    packet,
                    MismatchKind::SynSequenceChanged {
                        first: isn,
                        got: seg.seq,
                    },
                ));
            }
            (true, Some(_)) => (0, true),
            (false, None) => {
                return Err(self.mismatch(packet, MismatchKind::DataBeforeSyn { seq: seg.seq }));
            }
            (false, Some(isn)) => (seg.seq.wrapping_sub(isn).wrapping_sub(1), false),
        };

        if let Some(fin_offset) = self.fin_offset {
            let fin_repeat = seg.fin && !seg.syn && offset == fin_offset;
            if !fin_repeat {
                return Err(self.mismatch(
                    packet,
                    MismatchKind::TrafficAfterFin {
                        offset,
                        len: seg.payload_len,
                        fin_offset,
                    },
                ));
            }
        }

        Ok((offset, syn_repeat))
    }

    /// Flags the report for this segment must carry, before DROPPED.
    fn expected_flags(
        &self,
        packet: usize,
        seg: &TcpSegment,
        offset: u32,
        syn_repeat: bool,
    ) -> Result<ReportFlags, ReconcileError> {
        let mut expected = self.config.clock_flags;

        if seg.syn {
            expected |= ReportFlags::TCP_SYN;
            if syn_repeat {
                expected |= ReportFlags::TCP_RETRANS;
            }
            return Ok(expected);
        }

        if offset < self.max_offset {
            expected |= ReportFlags::TCP_RETRANS;
        }
        if seg.fin {
            let end = offset.saturating_add(seg.payload_len);
            if end < self.max_data_offset {
                return Err(self.mismatch(
                    packet,
                    MismatchKind::FinBeforeData {
                        fin_end: end,
                        data_end: self.max_data_offset,
                    },
                ));
            }
            expected |= ReportFlags::TCP_FIN;
            if self.fin_offset.is_some() {
                expected |= ReportFlags::TCP_RETRANS;
            }
        }
        Ok(expected)
    }

    fn check_match(
        &mut self,
        packet: usize,
        seg: &TcpSegment,
        offset: u32,
        mut expected: ReportFlags,
        report: &TimestampReport,
    ) -> Result<(), ReconcileError> {
        if self.skip.is_some() {
            expected |= ReportFlags::DROPPED;
        }
        if report.flags != expected {
            return Err(self.mismatch(
                packet,
                MismatchKind::Flags {
                    expected,
                    actual: report.flags,
                },
            ));
        }

        if report.bytes != seg.payload_len {
            return Err(self.mismatch(
                packet,
                MismatchKind::Length {
                    expected: seg.payload_len,
                    actual: report.bytes,
                },
            ));
        }

        if report.start != offset {
            let sentinel = seg.syn
                && report.start == SYN_START_SENTINEL
                && self.config.accept_syn_sentinel;
            if !sentinel {
                return Err(self.mismatch(
                    packet,
                    MismatchKind::Offset {
                        expected: offset,
                        actual: report.start,
                    },
                ));
            }
            if !self.sentinel_warned {
                warn!(
                    "[tcp] report #{}: SYN start is {:#x} instead of 0, accepting",
                    self.cursor, report.start
                );
                self.sentinel_warned = true;
            }
            self.stats.syn_sentinel_reports += 1;
        }

        let adjusted = self.clock_offset.apply(report.timestamp);
        let deviation_ns = adjusted.nanos_since(&seg.timestamp);
        let tolerance_ns = self.config.tolerance_ns();
        if deviation_ns.unsigned_abs() > tolerance_ns {
            return Err(self.mismatch(
                packet,
                MismatchKind::Timestamp {
                    deviation_ns,
                    tolerance_ns,
                },
            ));
        }
        self.stats.max_deviation_ns = self.stats.max_deviation_ns.max(deviation_ns.unsigned_abs());

        trace!(
            "[tcp] packet #{} matched report #{} (start={} len={} flags={} dev={}ns)",
            packet,
            self.cursor,
            report.start,
            report.bytes,
            report.flags,
            deviation_ns
        );
        Ok(())
    }

    fn record_match(&mut self, expected: ReportFlags, seg: &TcpSegment) {
        if let Some(run) = self.skip.take() {
            self.stats.dropped_reports += 1;
            self.stats.skipped_packets += run.count;
            debug!(
                "[tcp] report #{} closes a gap of {} packets",
                self.cursor, run.count
            );
        }
        if expected.contains(ReportFlags::TCP_RETRANS) {
            if seg.syn {
                self.stats.retransmits.syn += 1;
            } else if seg.fin {
                self.stats.retransmits.fin += 1;
            } else {
                self.stats.retransmits.data += 1;
            }
        }
        self.stats.matched += 1;
        self.cursor += 1;
    }

    fn advance_bounds(&mut self, seg: &TcpSegment, offset: u32) {
        if seg.syn {
            return;
        }
        let end = offset.saturating_add(seg.payload_len);
        self.max_offset = self.max_offset.max(end);
        if seg.fin {
            self.fin_offset = Some(offset);
            self.state = TcpState::Terminated;
        } else {
            self.max_data_offset = self.max_data_offset.max(end);
        }
    }

    /// A skip run whose report was never reached: blame the first skipped packet.
    fn unresolved_skip(&self, run: SkipRun, report: &TimestampReport) -> ReconcileError {
        ReconcileError::Mismatch {
            report: self.cursor,
            packet: run.packet,
            kind: MismatchKind::Offset {
                expected: run.offset,
                actual: report.start,
            },
        }
    }

    fn mismatch(&self, packet: usize, kind: MismatchKind) -> ReconcileError {
        ReconcileError::Mismatch {
            report: self.cursor,
            packet,
            kind,
        }
    }
}

/// Reconcile a TCP report sequence against a capture.
///
/// Runs the report-order pre-pass, folds every segment through a
/// [`TcpReconciler`] and applies the end-of-stream coverage checks.
pub fn reconcile_tcp(
    reports: &[TimestampReport],
    capture: &[TcpSegment],
    clock_offset: ClockOffset,
    config: &ReconcileConfig,
) -> Result<TcpStats, ReconcileError> {
    config.validate()?;
    check_timestamps(capture.iter().map(|seg| &seg.timestamp))?;
    check_report_order(reports, Transport::Tcp)?;

    debug!(
        "[tcp] reconciling {} reports against {} captured segments (offset {})",
        reports.len(),
        capture.len(),
        clock_offset
    );

    let mut reconciler = TcpReconciler::new(reports, clock_offset, config);
    capture
        .iter()
        .try_for_each(|seg| reconciler.on_segment(seg))?;
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Timespec;

    const BASE: ReportFlags = ReportFlags::CLOCK_SET.with(ReportFlags::CLOCK_IN_SYNC);
    const SYN: ReportFlags = BASE.with(ReportFlags::TCP_SYN);

    fn at(ms: i64) -> Timespec {
        Timespec::from_millis(ms)
    }

    #[test]
    fn test_sentinel_warning_latched_once() {
        let config = ReconcileConfig::open_connection();
        let reports = [
            TimestampReport::new(SYN_START_SENTINEL, 0, at(10), SYN),
            TimestampReport::new(SYN_START_SENTINEL, 0, at(12), SYN | ReportFlags::TCP_RETRANS),
            TimestampReport::new(0, 10, at(20), BASE),
        ];
        let mut reconciler = TcpReconciler::new(&reports, ClockOffset::ZERO, &config);
        assert!(!reconciler.sentinel_warned);

        reconciler
            .on_segment(&TcpSegment::syn(7, at(10)))
            .expect("first SYN");
        assert!(reconciler.sentinel_warned);
        assert_eq!(reconciler.stats().syn_sentinel_reports, 1);

        // Second sentinel is counted but the warning stays latched
        reconciler
            .on_segment(&TcpSegment::syn(7, at(12)))
            .expect("SYN retransmit");
        assert!(reconciler.sentinel_warned);
        assert_eq!(reconciler.stats().syn_sentinel_reports, 2);

        reconciler
            .on_segment(&TcpSegment::data(8, 10, at(20)))
            .expect("data");
        let stats = reconciler.finish().expect("finish");
        assert_eq!(stats.syn_sentinel_reports, 2);
        assert_eq!(stats.retransmits.syn, 1);
    }

    #[test]
    fn test_no_sentinel_no_warning() {
        let config = ReconcileConfig::open_connection();
        let reports = [TimestampReport::new(0, 0, at(10), SYN)];
        let mut reconciler = TcpReconciler::new(&reports, ClockOffset::ZERO, &config);

        reconciler
            .on_segment(&TcpSegment::syn(7, at(10)))
            .expect("SYN");
        assert!(!reconciler.sentinel_warned);
        assert_eq!(reconciler.stats().syn_sentinel_reports, 0);
    }

    #[test]
    fn test_failure_recorded_on_error_path() {
        let config = ReconcileConfig::open_connection();
        let reports = [TimestampReport::new(0, 0, at(10), SYN)];
        let mut reconciler = TcpReconciler::new(&reports, ClockOffset::ZERO, &config);

        reconciler
            .on_segment(&TcpSegment::data(8, 10, at(20)))
            .expect_err("data before SYN");
        assert!(reconciler.has_failed());
        assert_eq!(reconciler.failed_at, Some(0));
        assert_eq!(reconciler.state(), TcpState::Init);
    }
}
