// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Report stream self-consistency, checked before any packet matching.

use log::trace;

use crate::error::{ProtocolViolation, ReconcileError};
use crate::report::{ReportFlags, TimestampReport};

/// How report `start` values are addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Byte offsets; retransmitted and SYN reports may go backwards.
    Tcp,
    /// Dense packet indices; strictly increasing.
    Udp,
}

/// Check timestamps never decrease and `start` values progress.
///
/// TCP: `start` is non-decreasing across reports not flagged RETRANS or
/// SYN. UDP: `start` strictly increases.
pub fn check_report_order(
    reports: &[TimestampReport],
    transport: Transport,
) -> Result<(), ReconcileError> {
    let mut prev: Option<&TimestampReport> = None;
    let mut fresh_start: Option<u32> = None;

    for (index, report) in reports.iter().enumerate() {
        if let Some(prev) = prev {
            if report.timestamp < prev.timestamp {
                return Err(violation(
                    index,
                    ProtocolViolation::TimestampRegressed {
                        prev: prev.timestamp.to_string(),
                        next: report.timestamp.to_string(),
                    },
                ));
            }
        }

        match transport {
            Transport::Tcp => {
                let exempt = report
                    .flags
                    .intersects(ReportFlags::TCP_RETRANS | ReportFlags::TCP_SYN);
                if !exempt {
                    if let Some(last) = fresh_start {
                        if report.start < last {
                            return Err(violation(
                                index,
                                ProtocolViolation::OffsetRegressed {
                                    prev: last,
                                    next: report.start,
                                },
                            ));
                        }
                    }
                    fresh_start = Some(report.start);
                }
            }
            Transport::Udp => {
                if let Some(prev) = prev {
                    if report.start <= prev.start {
                        return Err(violation(
                            index,
                            ProtocolViolation::StartNotIncreasing {
                                prev: prev.start,
                                next: report.start,
                            },
                        ));
                    }
                }
            }
        }
        prev = Some(report);
    }

    trace!("[order] {} {:?} reports in order", reports.len(), transport);
    Ok(())
}

fn violation(index: usize, violation: ProtocolViolation) -> ReconcileError {
    ReconcileError::Protocol { index, violation }
}
