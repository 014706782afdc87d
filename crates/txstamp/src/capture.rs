// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ground-truth packets observed on the wire.
//!
//! A capture source pushes packets one at a time, in arrival order, with a
//! timestamp from the capturing host's clock. TCP segments carry raw
//! sequence numbers; the reconciler derives logical offsets from the
//! connection's initial sequence number. UDP datagrams carry the dense index
//! the traffic driver assigned when sending.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::report::Timespec;

/// Captured TCP segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSegment {
    /// Raw TCP sequence number.
    pub seq: u32,
    /// TCP payload length.
    pub payload_len: u32,
    /// SYN flag.
    #[serde(default)]
    pub syn: bool,
    /// FIN flag.
    #[serde(default)]
    pub fin: bool,
    /// Capture timestamp (capturing host clock).
    pub timestamp: Timespec,
}

impl TcpSegment {
    /// SYN segment.
    pub fn syn(seq: u32, timestamp: Timespec) -> Self {
        Self {
            seq,
            payload_len: 0,
            syn: true,
            fin: false,
            timestamp,
        }
    }

    /// Data segment.
    pub fn data(seq: u32, payload_len: u32, timestamp: Timespec) -> Self {
        Self {
            seq,
            payload_len,
            syn: false,
            fin: false,
            timestamp,
        }
    }

    /// FIN segment (optionally carrying data).
    pub fn fin(seq: u32, payload_len: u32, timestamp: Timespec) -> Self {
        Self {
            seq,
            payload_len,
            syn: false,
            fin: true,
            timestamp,
        }
    }

    /// Pure ACK: no payload, neither SYN nor FIN. Never reported.
    pub fn is_pure_ack(&self) -> bool {
        self.payload_len == 0 && !self.syn && !self.fin
    }
}

/// Captured UDP datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpDatagram {
    /// Dense index assigned by the sender (0, 1, 2, ...).
    pub index: u32,
    /// UDP payload length.
    pub payload_len: u32,
    /// Capture timestamp (capturing host clock).
    pub timestamp: Timespec,
}

impl UdpDatagram {
    /// Create a datagram descriptor.
    pub fn new(index: u32, payload_len: u32, timestamp: Timespec) -> Self {
        Self {
            index,
            payload_len,
            timestamp,
        }
    }
}

/// Push-based stream of captured packets.
pub trait CaptureSource<P> {
    /// Deliver every captured packet, in arrival order, to `sink`.
    fn subscribe(&mut self, sink: &mut dyn FnMut(P)) -> Result<(), SourceError>;
}

/// Capture source replaying a recorded packet list.
#[derive(Clone, Debug, Default)]
pub struct ReplayCapture<P> {
    packets: Vec<P>,
}

impl<P> ReplayCapture<P> {
    /// Replay `packets` in order.
    pub fn new(packets: Vec<P>) -> Self {
        Self { packets }
    }

    /// Number of packets left to replay.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// `true` once everything was replayed.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl<P> CaptureSource<P> for ReplayCapture<P> {
    fn subscribe(&mut self, sink: &mut dyn FnMut(P)) -> Result<(), SourceError> {
        for packet in self.packets.drain(..) {
            sink(packet);
        }
        Ok(())
    }
}

/// Materialize a capture source into an ordered packet list.
pub fn collect_capture<P, S>(source: &mut S) -> Result<Vec<P>, SourceError>
where
    S: CaptureSource<P> + ?Sized,
{
    let mut packets = Vec::new();
    source.subscribe(&mut |packet| packets.push(packet))?;
    debug!("[capture] collected {} packets", packets.len());
    Ok(packets)
}

/// Check capture timestamps are normalized.
pub(crate) fn check_timestamps<'a, I>(stamps: I) -> Result<(), SourceError>
where
    I: IntoIterator<Item = &'a Timespec>,
{
    for (index, ts) in stamps.into_iter().enumerate() {
        if !ts.is_normalized() {
            return Err(SourceError::MalformedTimestamp {
                index,
                sec: ts.sec,
                nsec: i64::from(ts.nsec),
            });
        }
    }
    Ok(())
}

/// Check a UDP capture is the dense sequence 0, 1, 2, ... in order.
pub fn check_udp_indices(datagrams: &[UdpDatagram]) -> Result<(), SourceError> {
    for (position, dgram) in datagrams.iter().enumerate() {
        if dgram.index as usize != position {
            return Err(SourceError::CaptureOutOfOrder {
                position,
                index: dgram.index,
            });
        }
    }
    Ok(())
}
