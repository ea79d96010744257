// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link counters.

use crate::error::PacketError;

/// Link statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkStats {
    /// Raw bytes read from the link.
    pub bytes_read: u64,
    /// Raw bytes written to the link.
    pub bytes_written: u64,
    /// Non-empty frames produced by the decoder.
    pub frames_decoded: u64,
    /// SLIP framing violations.
    pub protocol_violations: u64,
    /// Frames that passed validation.
    pub packets_accepted: u64,
    /// Rejected: shorter than header + CRC.
    pub rejected_short: u64,
    /// Rejected: CRC mismatch.
    pub rejected_crc: u64,
    /// Rejected: no-op command.
    pub rejected_opcode: u64,
    /// Rejected: core out of range.
    pub rejected_core: u64,
    /// Rejected: read count inconsistent with the remaining byte.
    pub rejected_count: u64,
    /// Accepted packets handed to a driver.
    pub packets_routed: u64,
    /// Accepted packets for a core with no driver.
    pub routing_misses: u64,
    /// Packets fully written to the link.
    pub packets_sent: u64,
    /// Writes refused with would-block.
    pub tx_would_block: u64,
    /// Short or failed writes.
    pub tx_errors: u64,
    /// Acknowledgment timers that expired.
    pub missing_acks: u64,
}

impl LinkStats {
    /// Total rejected frames.
    #[must_use]
    pub fn packets_rejected(&self) -> u64 {
        self.rejected_short
            + self.rejected_crc
            + self.rejected_opcode
            + self.rejected_core
            + self.rejected_count
    }

    pub(crate) fn record_rejection(&mut self, err: &PacketError) {
        match err {
            PacketError::TooShort(_) | PacketError::TooLong(_) | PacketError::CountOverflow(_) => {
                self.rejected_short += 1;
            }
            PacketError::CrcMismatch => self.rejected_crc += 1,
            PacketError::NoOperation(_) => self.rejected_opcode += 1,
            PacketError::CoreOutOfRange(_) => self.rejected_core += 1,
            PacketError::ReadCountMismatch { .. } => self.rejected_count += 1,
        }
    }
}
