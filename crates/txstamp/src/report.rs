// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit-timestamp report records.
//!
//! A report asserts that a range of sent bytes (TCP) or one datagram (UDP)
//! left the NIC at a given time. Reports arrive from the report source in
//! their wire shape ([`RawReport`]) and are validated into
//! [`TimestampReport`] before any reconciliation takes place.
//!
//! # Wire Shape
//!
//! ```text
//! struct Report {
//!   start:     u32        // byte offset (TCP) or packet index (UDP)
//!   bytes:     u32        // payload length
//!   timestamp: { sec: i64, nsec: i64 }
//!   flags:     u32        // CLOCK_SET=1, CLOCK_IN_SYNC=2, DROPPED=4,
//!                         // TCP_RETRANS=8, TCP_SYN=16, TCP_FIN=32
//! }
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: i64 = 1_000_000;

// ============================================================================
// Timespec
// ============================================================================

/// Seconds + nanoseconds point in time, as carried by reports and captures.
///
/// Invariant: `nsec < 1_000_000_000`. Values built through [`Timespec::new`]
/// or [`Timespec::from_nanos`] are always normalized; deserialized values are
/// checked with [`Timespec::is_normalized`] before use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timespec {
    /// Whole seconds (may be negative for pre-epoch or offset-adjusted times).
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nsec: u32,
}

impl Timespec {
    /// Build a normalized timespec from possibly out-of-range parts.
    pub fn new(sec: i64, nsec: i64) -> Self {
        Self::from_nanos(i128::from(sec) * i128::from(NANOS_PER_SEC) + i128::from(nsec))
    }

    /// Build from a total nanosecond count.
    pub fn from_nanos(total: i128) -> Self {
        let per_sec = i128::from(NANOS_PER_SEC);
        Self {
            sec: total.div_euclid(per_sec) as i64,
            nsec: total.rem_euclid(per_sec) as u32,
        }
    }

    /// Build from milliseconds.
    pub fn from_millis(ms: i64) -> Self {
        Self::from_nanos(i128::from(ms) * i128::from(NANOS_PER_MILLI))
    }

    /// Total nanoseconds since the clock's epoch.
    pub fn as_nanos(&self) -> i128 {
        i128::from(self.sec) * i128::from(NANOS_PER_SEC) + i128::from(self.nsec)
    }

    /// `true` if `nsec` lies in `[0, 1e9)`.
    pub fn is_normalized(&self) -> bool {
        i64::from(self.nsec) < NANOS_PER_SEC
    }

    /// Signed difference `self - other` in nanoseconds.
    pub fn nanos_since(&self, other: &Timespec) -> i128 {
        self.as_nanos() - other.as_nanos()
    }
}

impl PartialOrd for Timespec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timespec {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.nsec).cmp(&(other.sec, other.nsec))
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Report flag set (wire bitmask).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ReportFlags(u32);

impl ReportFlags {
    /// Timestamp clock has been set.
    pub const CLOCK_SET: Self = Self(0x0001);

    /// Timestamp clock is synchronized.
    pub const CLOCK_IN_SYNC: Self = Self(0x0002);

    /// One or more preceding reports were discarded by the reporting channel.
    pub const DROPPED: Self = Self(0x0004);

    /// TCP retransmission.
    pub const TCP_RETRANS: Self = Self(0x0008);

    /// TCP segment carrying SYN.
    pub const TCP_SYN: Self = Self(0x0010);

    /// TCP segment carrying FIN.
    pub const TCP_FIN: Self = Self(0x0020);

    /// Union of every defined bit.
    pub const ALL: Self = Self(0x003f);

    /// Bits only meaningful on TCP reports.
    pub const TCP_ONLY: Self = Self(0x0038);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::CLOCK_SET, "CLOCK_SET"),
        (Self::CLOCK_IN_SYNC, "CLOCK_IN_SYNC"),
        (Self::DROPPED, "DROPPED"),
        (Self::TCP_RETRANS, "TCP_RETRANS"),
        (Self::TCP_SYN, "TCP_SYN"),
        (Self::TCP_FIN, "TCP_FIN"),
    ];

    /// Empty flags
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw wire bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from wire bits, rejecting undefined bits.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Check if every bit of `flag` is set
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Check if any bit of `flag` is set
    pub const fn intersects(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Flags with `flag` added.
    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// Flags with `flag` removed.
    #[must_use]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }

    /// Check if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ReportFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for ReportFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

impl fmt::Display for ReportFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ReportFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportFlags({self} = {:#04x})", self.0)
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Validated transmit-timestamp report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampReport {
    /// TCP: logical byte offset of the payload. UDP: dense packet index.
    pub start: u32,
    /// Payload length in bytes.
    pub bytes: u32,
    /// Transmit time on the reporting host's clock.
    pub timestamp: Timespec,
    /// Report flags.
    pub flags: ReportFlags,
}

impl TimestampReport {
    /// Create a report.
    pub fn new(start: u32, bytes: u32, timestamp: Timespec, flags: ReportFlags) -> Self {
        Self {
            start,
            bytes,
            timestamp,
            flags,
        }
    }
}

/// Timestamp as it appears on the wire (signed nanoseconds).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTimespec {
    /// Seconds.
    pub sec: i64,
    /// Nanoseconds (must be in `[0, 1e9)` to be accepted).
    pub nsec: i64,
}

/// Report record exactly as delivered by the report source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReport {
    /// Byte offset (TCP) or packet index (UDP).
    pub start: u32,
    /// Payload length.
    pub bytes: u32,
    /// Transmit timestamp.
    pub timestamp: RawTimespec,
    /// Flag bitmask.
    pub flags: u32,
}

impl RawReport {
    /// Validate into a [`TimestampReport`].
    ///
    /// `index` is the record's position in the source stream and only serves
    /// error diagnostics.
    pub fn validate(self, index: usize) -> Result<TimestampReport, SourceError> {
        let RawTimespec { sec, nsec } = self.timestamp;
        if !(0..NANOS_PER_SEC).contains(&nsec) {
            return Err(SourceError::MalformedTimestamp { index, sec, nsec });
        }
        let flags = ReportFlags::from_bits(self.flags)
            .ok_or(SourceError::UnknownFlags { index, bits: self.flags })?;
        Ok(TimestampReport {
            start: self.start,
            bytes: self.bytes,
            timestamp: Timespec {
                sec,
                nsec: nsec as u32,
            },
            flags,
        })
    }
}

impl From<TimestampReport> for RawReport {
    fn from(report: TimestampReport) -> Self {
        Self {
            start: report.start,
            bytes: report.bytes,
            timestamp: RawTimespec {
                sec: report.timestamp.sec,
                nsec: i64::from(report.timestamp.nsec),
            },
            flags: report.flags.bits(),
        }
    }
}

/// Validate a whole batch of raw records, preserving order.
pub fn validate_all(raw: &[RawReport]) -> Result<Vec<TimestampReport>, SourceError> {
    raw.iter()
        .enumerate()
        .map(|(index, r)| r.validate(index))
        .collect()
}
