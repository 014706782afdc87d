// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recorded trace bundles.
//!
//! A bundle stores everything one reconciliation pass needs: the transport,
//! the measured clock offset, the raw report records as drained from the
//! source and the capture. Bundles are JSON:
//!
//! ```json
//! {
//!   "transport": "tcp",
//!   "clock_offset_ms": 12,
//!   "reports": [{"start": 0, "bytes": 0, "timestamp": {"sec": 1, "nsec": 0}, "flags": 19}],
//!   "capture": [{"seq": 1000, "payload_len": 0, "syn": true, "timestamp": {"sec": 1, "nsec": 0}}]
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::capture::{TcpSegment, UdpDatagram};
use crate::clock::ClockOffset;
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, SourceError};
use crate::report::{validate_all, RawReport};
use crate::stats::{TcpStats, UdpStats};
use crate::tcp::reconcile_tcp;
use crate::udp::reconcile_udp;

/// One recorded run, ready for offline reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TraceBundle {
    /// TCP connection trace.
    Tcp {
        /// `clock(reporting host) - clock(capturing host)` in ms.
        #[serde(default)]
        clock_offset_ms: i64,
        /// Reports in drain order.
        reports: Vec<RawReport>,
        /// Segments in arrival order.
        capture: Vec<TcpSegment>,
    },
    /// UDP flow trace.
    Udp {
        /// `clock(reporting host) - clock(capturing host)` in ms.
        #[serde(default)]
        clock_offset_ms: i64,
        /// Reports in drain order.
        reports: Vec<RawReport>,
        /// Every datagram sent, by index.
        capture: Vec<UdpDatagram>,
    },
}

/// Result of replaying a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TraceVerdict {
    /// TCP counters.
    Tcp(TcpStats),
    /// UDP counters.
    Udp(UdpStats),
}

impl TraceVerdict {
    /// Number of DROPPED-flagged reports.
    pub fn drop_count(&self) -> u64 {
        match self {
            TraceVerdict::Tcp(stats) => stats.drop_count(),
            TraceVerdict::Udp(stats) => stats.drop_count(),
        }
    }
}

impl std::fmt::Display for TraceVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceVerdict::Tcp(stats) => write!(f, "tcp: {stats}"),
            TraceVerdict::Udp(stats) => write!(f, "udp: {stats}"),
        }
    }
}

impl TraceBundle {
    /// Transport name.
    pub fn transport(&self) -> &'static str {
        match self {
            TraceBundle::Tcp { .. } => "tcp",
            TraceBundle::Udp { .. } => "udp",
        }
    }

    /// Recorded clock offset.
    pub fn clock_offset(&self) -> ClockOffset {
        match self {
            TraceBundle::Tcp {
                clock_offset_ms, ..
            }
            | TraceBundle::Udp {
                clock_offset_ms, ..
            } => ClockOffset::from_millis(*clock_offset_ms),
        }
    }

    /// Raw report records.
    pub fn reports(&self) -> &[RawReport] {
        match self {
            TraceBundle::Tcp { reports, .. } | TraceBundle::Udp { reports, .. } => reports,
        }
    }

    /// Read a bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref())?;
        let bundle: TraceBundle = serde_json::from_reader(BufReader::new(file))?;
        debug!(
            "[trace] loaded {} bundle from {} ({} reports)",
            bundle.transport(),
            path.as_ref().display(),
            bundle.reports().len()
        );
        Ok(bundle)
    }

    /// Write the bundle as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SourceError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Validate the records and run the matching reconciler.
    pub fn reconcile(&self, config: &ReconcileConfig) -> Result<TraceVerdict, ReconcileError> {
        let reports = validate_all(self.reports())?;
        match self {
            TraceBundle::Tcp { capture, .. } => {
                reconcile_tcp(&reports, capture, self.clock_offset(), config).map(TraceVerdict::Tcp)
            }
            TraceBundle::Udp { capture, .. } => {
                reconcile_udp(&reports, capture, self.clock_offset(), config).map(TraceVerdict::Udp)
            }
        }
    }
}
