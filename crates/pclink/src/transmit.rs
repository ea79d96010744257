// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit path and link ownership.
//!
//! [`Transmitter`] owns the link. Outgoing packets get their sentinel
//! nibbles, a CRC and SLIP framing, and go out in one non-blocking write.
//! Nothing is retried here: a would-block or short write is reported and
//! the driver decides what to do.

use std::io;

use crate::error::TxError;
use crate::frame::{encode_frame, MAX_ENCODED_LEN};
use crate::link::Link;
use crate::packet::{cmd, CoreIndex, HexDump, Packet, CORE_SENTINEL, HEADER_LEN};
use crate::stats::LinkStats;

/// Owner of the link and its counters.
pub struct Transmitter {
    link: Box<dyn Link>,
    name: String,
    frame: Vec<u8>,
    stats: LinkStats,
    trace_packets: bool,
}

impl Transmitter {
    #[must_use]
    pub fn new(link: Box<dyn Link>, trace_packets: bool) -> Self {
        let name = link.describe();
        Self {
            link,
            name,
            frame: Vec::with_capacity(MAX_ENCODED_LEN),
            stats: LinkStats::default(),
            trace_packets,
        }
    }

    /// Link name for log messages.
    #[inline]
    #[must_use]
    pub fn link_name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn trace_packets(&self) -> bool {
        self.trace_packets
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    #[inline]
    pub(crate) fn stats_mut(&mut self) -> &mut LinkStats {
        &mut self.stats
    }

    pub(crate) fn link_mut(&mut self) -> &mut dyn Link {
        self.link.as_mut()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Send a packet to `core`.
    pub fn send(&mut self, core: CoreIndex, packet: &Packet) -> Result<(), TxError> {
        self.send_raw(core, &packet.to_bytes())
    }

    /// Send a logical packet (header + payload) to `core`.
    ///
    /// The high nibbles of the command and core bytes are forced to the
    /// transmit sentinels. `Ok` means every framed byte was written.
    pub fn send_raw(&mut self, core: CoreIndex, logical: &[u8]) -> Result<(), TxError> {
        if logical.len() < HEADER_LEN {
            tracing::warn!(
                core = core.get(),
                len = logical.len(),
                "invalid packet from driver"
            );
            return Err(TxError::TooShort(logical.len()));
        }
        if !self.link.is_open() {
            tracing::warn!("sending packet to non-existent board at {}", self.name);
            return Err(TxError::NotConnected);
        }

        let mut packet = logical.to_vec();
        packet[0] |= cmd::SENTINEL;
        packet[1] = CORE_SENTINEL | core.get() as u8;

        self.frame.clear();
        let expected = encode_frame(&packet, &mut self.frame)?;

        if self.trace_packets {
            tracing::trace!(">>{}", HexDump(&packet));
        }

        match self.link.write(&self.frame) {
            Ok(sent) if sent == expected => {
                self.stats.bytes_written += sent as u64;
                self.stats.packets_sent += 1;
                Ok(())
            }
            Ok(sent) => {
                self.stats.bytes_written += sent as u64;
                self.stats.tx_errors += 1;
                tracing::error!(
                    core = core.get(),
                    sent,
                    expected,
                    "short write to board at {}",
                    self.name
                );
                Err(TxError::Partial { sent, expected })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.stats.tx_would_block += 1;
                Err(TxError::WouldBlock)
            }
            Err(e) => {
                self.stats.tx_errors += 1;
                tracing::error!(
                    core = core.get(),
                    expected,
                    error = %e,
                    "write to board at {} failed",
                    self.name
                );
                Err(TxError::Io(e))
            }
        }
    }
}
