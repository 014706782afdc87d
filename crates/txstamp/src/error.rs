// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconciliation error taxonomy.
//!
//! Every variant is terminal for a reconciliation pass: the first violation
//! aborts with the offending report/packet indices and the expected vs.
//! observed values.

use std::io;

use thiserror::Error;

use crate::report::ReportFlags;

/// Top-level reconciliation failure.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Report, capture or clock source failed or produced malformed data.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Report stream is internally inconsistent.
    #[error("report stream violation at report #{index}: {violation}")]
    Protocol {
        /// Index of the offending report.
        index: usize,
        /// What was violated.
        violation: ProtocolViolation,
    },

    /// A report does not match the captured packet it was paired with.
    #[error("report #{report} vs packet #{packet}: {kind}")]
    Mismatch {
        /// Index of the report (cursor position).
        report: usize,
        /// Index of the qualifying captured packet.
        packet: usize,
        /// Mismatch details.
        kind: MismatchKind,
    },

    /// Reports and captured packets do not correspond 1:1.
    #[error("coverage error: {0}")]
    Coverage(CoverageError),

    /// A streaming pass was fed or closed after it had already failed.
    #[error("reconciliation already failed at packet #{packet}")]
    Aborted {
        /// Packet whose processing failed first.
        packet: usize,
    },

    /// Caller supplied an unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// `true` for [`ReconcileError::Mismatch`].
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }

    /// `true` for [`ReconcileError::Coverage`].
    pub fn is_coverage(&self) -> bool {
        matches!(self, Self::Coverage(_))
    }

    /// `true` for [`ReconcileError::Protocol`].
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// `true` when the inputs or configuration were unusable, as opposed to
    /// a trace that was checked and rejected.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Config(_))
    }

    /// Mismatch details, if this is a mismatch.
    pub fn mismatch_kind(&self) -> Option<&MismatchKind> {
        match self {
            Self::Mismatch { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<CoverageError> for ReconcileError {
    fn from(err: CoverageError) -> Self {
        Self::Coverage(err)
    }
}

/// Failure of a report, capture or clock source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source reported an explicit failure.
    #[error("source failed: {0}")]
    Failed(String),

    /// Underlying I/O failure (clock read, trace file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Trace file could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source returned more records than requested.
    #[error("source returned {returned} records for a request of {requested}")]
    Oversized {
        /// Requested batch size.
        requested: usize,
        /// Number of records returned.
        returned: usize,
    },

    /// Record carries a nanosecond field outside `[0, 1e9)`.
    #[error("record #{index} has malformed timestamp {sec}s {nsec}ns")]
    MalformedTimestamp {
        /// Record index in the source stream.
        index: usize,
        /// Seconds field.
        sec: i64,
        /// Nanoseconds field.
        nsec: i64,
    },

    /// Record carries undefined flag bits.
    #[error("record #{index} has unknown flag bits {bits:#x}")]
    UnknownFlags {
        /// Record index in the source stream.
        index: usize,
        /// Raw flag bits.
        bits: u32,
    },

    /// UDP capture is not a dense, ordered index sequence.
    #[error("captured datagram at position {position} carries index {index}")]
    CaptureOutOfOrder {
        /// Position in the capture.
        position: usize,
        /// Index carried by the datagram.
        index: u32,
    },
}

impl SourceError {
    /// Create an explicit source failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Internal inconsistency of the report stream, independent of captures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Report timestamp went backwards.
    #[error("timestamp went backwards ({prev} -> {next})")]
    TimestampRegressed {
        /// Previous report timestamp.
        prev: String,
        /// Offending report timestamp.
        next: String,
    },

    /// Non-retransmitted TCP report offset went backwards.
    #[error("stream offset went backwards ({prev} -> {next})")]
    OffsetRegressed {
        /// Highest offset seen on a fresh report so far.
        prev: u32,
        /// Offending offset.
        next: u32,
    },

    /// UDP report index did not strictly increase.
    #[error("packet index not strictly increasing ({prev} -> {next})")]
    StartNotIncreasing {
        /// Previous report index.
        prev: u32,
        /// Offending report index.
        next: u32,
    },
}

/// Disagreement between a report and the captured packet it covers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MismatchKind {
    /// Flags differ from the set derived from the capture.
    #[error("flags mismatch: expected {expected}, got {actual}")]
    Flags {
        /// Flags derived from the capture.
        expected: ReportFlags,
        /// Flags carried by the report.
        actual: ReportFlags,
    },

    /// Report length differs from captured payload length.
    #[error("length mismatch: expected {expected}, got {actual}")]
    Length {
        /// Captured payload length.
        expected: u32,
        /// Report byte count.
        actual: u32,
    },

    /// Report offset differs from the captured packet's logical offset.
    #[error("offset mismatch: expected {expected}, got {actual}")]
    Offset {
        /// Logical offset derived from the capture.
        expected: u32,
        /// Report offset.
        actual: u32,
    },

    /// Clock-adjusted report timestamp is too far from capture time.
    #[error("timestamp deviation {deviation_ns}ns exceeds tolerance {tolerance_ns}ns")]
    Timestamp {
        /// Signed `adjusted(report) - capture` in nanoseconds.
        deviation_ns: i128,
        /// Configured tolerance in nanoseconds.
        tolerance_ns: u128,
    },

    /// A second SYN carried a different initial sequence number.
    #[error("SYN sequence changed: first {first:#x}, got {got:#x}")]
    SynSequenceChanged {
        /// Sequence number of the first SYN.
        first: u32,
        /// Sequence number of the offending SYN.
        got: u32,
    },

    /// Data or FIN arrived before any SYN was captured.
    #[error("packet with seq {seq:#x} captured before SYN")]
    DataBeforeSyn {
        /// Raw sequence number.
        seq: u32,
    },

    /// Traffic other than a FIN repeat arrived after FIN.
    #[error("traffic after FIN: offset {offset} len {len}, FIN at {fin_offset}")]
    TrafficAfterFin {
        /// Logical offset of the offending packet.
        offset: u32,
        /// Payload length of the offending packet.
        len: u32,
        /// Logical offset of the FIN.
        fin_offset: u32,
    },

    /// FIN ends below data already seen.
    #[error("FIN ends at {fin_end} but data reached {data_end}")]
    FinBeforeData {
        /// FIN offset + payload length.
        fin_end: u32,
        /// Highest data end seen.
        data_end: u32,
    },

    /// UDP report carries retransmit/SYN/FIN bits.
    #[error("report carries TCP-only flags {flags} on a UDP stream")]
    TcpFlagsOnUdp {
        /// Offending flags.
        flags: ReportFlags,
    },
}

/// Reports and captured packets do not correspond 1:1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverageError {
    /// Capture holds a qualifying packet with no report left to match.
    #[error("more packets than reports (packet #{packet}, {reports} reports)")]
    MorePacketsThanReports {
        /// Index of the unmatched packet.
        packet: usize,
        /// Total reports collected.
        reports: usize,
    },

    /// Reports remain after the capture was exhausted.
    #[error("{leftover} reports left unmatched after {consumed} matched")]
    LeftoverReports {
        /// Reports consumed.
        consumed: usize,
        /// Reports not consumed.
        leftover: usize,
    },

    /// Capture ended without a FIN.
    #[error("no FIN captured")]
    NoFin,

    /// UDP report refers to an index beyond the packets sent.
    #[error("report start {start} beyond {sent} packets sent")]
    ReportBeyondCapture {
        /// Report start index.
        start: u32,
        /// Packets sent.
        sent: usize,
    },

    /// UDP reports stop before the last packet sent.
    #[error("reports end at index {last:?}, expected {expected}")]
    Incomplete {
        /// Last reported start index (None if no report at all).
        last: Option<u32>,
        /// Expected last index (`sent - 1`).
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = ReconcileError::Mismatch {
            report: 3,
            packet: 4,
            kind: MismatchKind::Offset {
                expected: 100,
                actual: 150,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("#4"));
        assert!(msg.contains("expected 100, got 150"));
        assert!(err.is_mismatch());
        assert!(!err.is_coverage());
    }

    #[test]
    fn test_operational_errors() {
        assert!(ReconcileError::from(SourceError::failed("ring read")).is_operational());
        assert!(ReconcileError::config("min_batch must be at least 1").is_operational());

        let mismatch = ReconcileError::Mismatch {
            report: 0,
            packet: 0,
            kind: MismatchKind::Length {
                expected: 1,
                actual: 2,
            },
        };
        assert!(!mismatch.is_operational());
        assert!(!ReconcileError::from(CoverageError::NoFin).is_operational());
        assert!(!ReconcileError::Aborted { packet: 3 }.is_operational());
    }

    #[test]
    fn test_coverage_conversion() {
        let err: ReconcileError = CoverageError::NoFin.into();
        assert!(err.is_coverage());
        assert_eq!(err.to_string(), "coverage error: no FIN captured");
    }

    #[test]
    fn test_flags_mismatch_display() {
        let kind = MismatchKind::Flags {
            expected: ReportFlags::CLOCK_SET | ReportFlags::DROPPED,
            actual: ReportFlags::CLOCK_SET,
        };
        assert_eq!(
            kind.to_string(),
            "flags mismatch: expected CLOCK_SET|DROPPED, got CLOCK_SET"
        );
    }
}
