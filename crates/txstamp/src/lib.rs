// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit-Timestamp Report Reconciliation
//!
//! Checks a stream of hardware/driver "packet left the NIC at time T"
//! reports against an independently captured trace of the wire:
//! - every qualifying packet has exactly one report (or sits in a gap the
//!   report stream flagged as `DROPPED`)
//! - offsets, lengths and SYN/FIN/retransmit flags agree with the capture
//! - clock-adjusted report timestamps fall within a tolerance of capture time
//!
//! # Quick Start
//!
//! ```no_run
//! use txstamp::{drain, reconcile_tcp, ClockOffset, DrainConfig, MemorySource, ReconcileConfig};
//! # fn capture() -> Vec<txstamp::TcpSegment> { Vec::new() }
//! # fn main() -> Result<(), txstamp::ReconcileError> {
//! let mut source = MemorySource::default();
//! let reports = drain(&mut source, &DrainConfig::new(1, 16).with_seed(42))?;
//! let stats = reconcile_tcp(&reports, &capture(), ClockOffset::ZERO, &ReconcileConfig::new())?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```
//!
//! # Pipeline
//!
//! | Step | Module | Failure |
//! |------|--------|---------|
//! | clock offset | [`clock`] | `Source` |
//! | drain reports | [`collector`] | `Source`, `Config` |
//! | report order | [`order`] | `Protocol` |
//! | match TCP / UDP | [`tcp`], [`udp`] | `Mismatch`, `Coverage` |

pub mod capture;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod order;
pub mod report;
pub mod stats;
pub mod tcp;
pub mod trace;
pub mod udp;

pub use capture::{collect_capture, CaptureSource, ReplayCapture, TcpSegment, UdpDatagram};
pub use clock::{compute_offset, ClockId, ClockOffset, HostClock, LocalClock};
pub use collector::{drain, DrainConfig, MemorySource, ReportSource};
pub use config::ReconcileConfig;
pub use error::{CoverageError, MismatchKind, ProtocolViolation, ReconcileError, SourceError};
pub use order::{check_report_order, Transport};
pub use report::{RawReport, RawTimespec, ReportFlags, Timespec, TimestampReport};
pub use stats::{RetransmitCounts, TcpStats, UdpStats};
pub use tcp::{reconcile_tcp, TcpReconciler, TcpState};
pub use trace::{TraceBundle, TraceVerdict};
pub use udp::reconcile_udp;
