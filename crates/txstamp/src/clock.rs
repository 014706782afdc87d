// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host clocks and the reporting/capturing clock offset.
//!
//! Reports are stamped on the reporting host's clock (often a NIC PHC),
//! captures on the capturing host's clock. [`compute_offset`] samples two
//! clocks back to back and yields a [`ClockOffset`] that moves a report
//! timestamp into the capture clock's timescale. Precision is bounded by the
//! latency between the two reads, so the reconciliation tolerance must be at
//! least that large.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use log::debug;

use crate::error::SourceError;
use crate::report::{Timespec, NANOS_PER_MILLI};

// Linux-specific constants
#[cfg(target_os = "linux")]
mod linux_consts {
    pub const CLOCK_TAI: libc::clockid_t = 11;
}

/// Something that can tell the time on one host.
pub trait HostClock {
    /// Read the current time.
    fn now(&self) -> io::Result<Timespec>;

    /// Human-readable clock name for diagnostics.
    fn name(&self) -> String {
        String::from("clock")
    }
}

impl<C: HostClock + ?Sized> HostClock for &C {
    fn now(&self) -> io::Result<Timespec> {
        (**self).now()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Local clock selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockId {
    /// CLOCK_REALTIME (wall clock).
    Realtime,
    /// CLOCK_MONOTONIC.
    Monotonic,
    /// CLOCK_TAI.
    Tai,
    /// PTP hardware clock device (e.g. `/dev/ptp0`).
    Phc(PathBuf),
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockId::Realtime => f.write_str("realtime"),
            ClockId::Monotonic => f.write_str("monotonic"),
            ClockId::Tai => f.write_str("tai"),
            ClockId::Phc(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for ClockId {
    type Err = String;

    /// `realtime`, `monotonic`, `tai`, or a PHC device path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" | "rt" => Ok(ClockId::Realtime),
            "monotonic" | "mono" => Ok(ClockId::Monotonic),
            "tai" => Ok(ClockId::Tai),
            _ if s.starts_with('/') => Ok(ClockId::Phc(PathBuf::from(s))),
            _ => Err(format!(
                "unknown clock '{s}' (expected realtime, monotonic, tai or a /dev/ptpN path)"
            )),
        }
    }
}

/// Clock readable on the local host.
///
/// PHC devices stay open for the lifetime of the clock; the dynamic clock
/// id is derived from the open descriptor.
#[derive(Debug)]
pub struct LocalClock {
    clock_id: ClockId,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    phc: Option<File>,
}

impl LocalClock {
    /// Open a local clock.
    pub fn new(clock_id: ClockId) -> io::Result<Self> {
        let phc = match &clock_id {
            ClockId::Phc(path) => Some(open_phc(path)?),
            _ => None,
        };
        Ok(Self { clock_id, phc })
    }

    /// Wall clock.
    pub fn realtime() -> Self {
        Self {
            clock_id: ClockId::Realtime,
            phc: None,
        }
    }

    /// Check if this is a hardware clock (PHC).
    pub fn is_hardware_clock(&self) -> bool {
        matches!(self.clock_id, ClockId::Phc(_))
    }

    #[cfg(target_os = "linux")]
    fn raw_clockid(&self) -> libc::clockid_t {
        use std::os::unix::io::AsRawFd;

        match (&self.clock_id, &self.phc) {
            (ClockId::Phc(_), Some(file)) => fd_to_clockid(file.as_raw_fd()),
            (ClockId::Monotonic, _) => libc::CLOCK_MONOTONIC,
            (ClockId::Tai, _) => linux_consts::CLOCK_TAI,
            _ => libc::CLOCK_REALTIME,
        }
    }
}

impl HostClock for LocalClock {
    #[cfg(target_os = "linux")]
    fn now(&self) -> io::Result<Timespec> {
        clock_gettime_raw(self.raw_clockid())
    }

    #[cfg(not(target_os = "linux"))]
    fn now(&self) -> io::Result<Timespec> {
        use std::time::{SystemTime, UNIX_EPOCH};
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Timespec::from_nanos(now.as_nanos() as i128))
    }

    fn name(&self) -> String {
        self.clock_id.to_string()
    }
}

/// Raw clock_gettime call.
#[cfg(target_os = "linux")]
fn clock_gettime_raw(clockid: libc::clockid_t) -> io::Result<Timespec> {
    // SAFETY:
    // - timespec is a POD type that can be safely zero-initialized
    // - tv_sec and tv_nsec have no invalid bit patterns
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY:
    // - clockid is a valid clock ID (standard clock or PHC-derived via fd_to_clockid)
    // - &mut ts is a valid pointer to a properly sized timespec struct
    // - clock_gettime() will write valid time data on success
    let ret = unsafe { libc::clock_gettime(clockid, &mut ts) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Timespec::new(ts.tv_sec as i64, ts.tv_nsec as i64))
}

#[cfg(target_os = "linux")]
fn open_phc(path: &std::path::Path) -> io::Result<File> {
    std::fs::OpenOptions::new().read(true).open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_phc(_path: &std::path::Path) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "PHC not supported on this platform",
    ))
}

/// Convert PHC file descriptor to clockid_t.
///
/// Linux-specific: clockid = ~(fd << 3) | 3
#[cfg(target_os = "linux")]
fn fd_to_clockid(fd: i32) -> libc::clockid_t {
    (!(fd << 3) | 3) as libc::clockid_t
}

/// Millisecond offset `clock(reporting host) - clock(capturing host)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClockOffset(i64);

impl ClockOffset {
    /// No offset (both timestamps on the same clock).
    pub const ZERO: Self = Self(0);

    /// Offset in milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Offset in milliseconds.
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Move a reporting-host timestamp into the capturing host's timescale.
    pub fn apply(self, ts: Timespec) -> Timespec {
        Timespec::from_nanos(ts.as_nanos() - i128::from(self.0) * i128::from(NANOS_PER_MILLI))
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Sample `a` then `b` and return `clock(a) - clock(b)` truncated to ms.
pub fn compute_offset<A, B>(a: &A, b: &B) -> Result<ClockOffset, SourceError>
where
    A: HostClock + ?Sized,
    B: HostClock + ?Sized,
{
    let ta = a.now()?;
    let tb = b.now()?;
    let diff_ns = ta.nanos_since(&tb);
    let ms = diff_ns / i128::from(NANOS_PER_MILLI);
    let ms = i64::try_from(ms)
        .map_err(|_| SourceError::failed(format!("clock offset {diff_ns}ns out of range")))?;
    debug!(
        "[clock] {} - {} = {}ms ({} vs {})",
        a.name(),
        b.name(),
        ms,
        ta,
        tb
    );
    Ok(ClockOffset(ms))
}
