// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconciliation counters.

use std::fmt;

use serde::Serialize;

/// Retransmissions confirmed by the report stream, by segment kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetransmitCounts {
    /// Repeated SYN segments.
    pub syn: u64,
    /// Repeated FIN segments.
    pub fin: u64,
    /// Data resent below the highest offset already seen.
    pub data: u64,
}

impl RetransmitCounts {
    /// Total retransmissions of any kind.
    pub fn total(&self) -> u64 {
        self.syn + self.fin + self.data
    }

    /// Merge with another counter set.
    pub fn merge(&mut self, other: &RetransmitCounts) {
        self.syn += other.syn;
        self.fin += other.fin;
        self.data += other.data;
    }
}

/// Outcome counters of a successful TCP reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TcpStats {
    /// Report/packet pairs that matched.
    pub matched: u64,
    /// Pure ACKs filtered before matching.
    pub filtered_acks: u64,
    /// Retransmissions by kind.
    pub retransmits: RetransmitCounts,
    /// Reports flagged DROPPED.
    pub dropped_reports: u64,
    /// Captured packets covered only by a dropped-report gap.
    pub skipped_packets: u64,
    /// SYN reports carrying the `u32::MAX` start sentinel.
    pub syn_sentinel_reports: u64,
    /// Largest absolute timestamp deviation over matched pairs (ns).
    pub max_deviation_ns: u128,
}

impl TcpStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of DROPPED-flagged reports.
    pub fn drop_count(&self) -> u64 {
        self.dropped_reports
    }

    /// Total retransmissions of any kind.
    pub fn total_retransmits(&self) -> u64 {
        self.retransmits.total()
    }

    /// Merge with another stats instance.
    pub fn merge(&mut self, other: &TcpStats) {
        self.matched += other.matched;
        self.filtered_acks += other.filtered_acks;
        self.retransmits.merge(&other.retransmits);
        self.dropped_reports += other.dropped_reports;
        self.skipped_packets += other.skipped_packets;
        self.syn_sentinel_reports += other.syn_sentinel_reports;
        self.max_deviation_ns = self.max_deviation_ns.max(other.max_deviation_ns);
    }
}

impl fmt::Display for TcpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched={} acks={} retrans(syn={} fin={} data={}) drops={} skipped={} max_dev={}ns",
            self.matched,
            self.filtered_acks,
            self.retransmits.syn,
            self.retransmits.fin,
            self.retransmits.data,
            self.dropped_reports,
            self.skipped_packets,
            self.max_deviation_ns
        )
    }
}

/// Outcome counters of a successful UDP reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UdpStats {
    /// Report/datagram pairs that matched.
    pub matched: u64,
    /// Reports flagged DROPPED.
    pub dropped_reports: u64,
    /// Datagrams inside report gaps.
    pub lost_packets: u64,
    /// Largest absolute timestamp deviation over matched pairs (ns).
    pub max_deviation_ns: u128,
}

impl UdpStats {
    /// Number of DROPPED-flagged reports.
    pub fn drop_count(&self) -> u64 {
        self.dropped_reports
    }

    /// Merge with another stats instance.
    pub fn merge(&mut self, other: &UdpStats) {
        self.matched += other.matched;
        self.dropped_reports += other.dropped_reports;
        self.lost_packets += other.lost_packets;
        self.max_deviation_ns = self.max_deviation_ns.max(other.max_deviation_ns);
    }
}

impl fmt::Display for UdpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched={} drops={} lost={} max_dev={}ns",
            self.matched, self.dropped_reports, self.lost_packets, self.max_deviation_ns
        )
    }
}
