// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host <-> board packet layout.
//!
//! # Wire Format
//!
//! ```text
//! +-----+------+-----+-------+----------------+---------+
//! | cmd | core | reg | count | data[0..count] | crc16   |
//! | u8  | u8   | u8  | u8    | <= 510 bytes   | BE, 2B  |
//! +-----+------+-----+-------+----------------+---------+
//! ```
//!
//! The command byte:
//!
//! | Bit | Meaning |
//! |-----|---------|
//! | 7 | response type: 0 = automatic (unsolicited), 1 = reply to a host request |
//! | 5-4 | reserved |
//! | 3-2 | operation: 00 no-op, 01 read, 10 write, 11 write-read |
//! | 1 | autoincrement destination register |
//!
//! On transmit the upper nibble of `cmd` is forced to `0xF` and the upper
//! nibble of `core` to `0xE`; the board uses both as a sanity check.

use std::fmt;

use crate::crc::CRC_LEN;
use crate::error::PacketError;

/// Number of peripheral cores in an FPGA image.
pub const NUM_CORE: usize = 16;

/// Fixed header length (cmd, core, reg, count).
pub const HEADER_LEN: usize = 4;

/// Maximum payload bytes in one packet.
pub const PKT_DATA_SZ: usize = 510;

/// Largest logical packet (header + payload) accepted for framing.
pub const PC_PKTLEN: usize = HEADER_LEN + PKT_DATA_SZ;

/// Smallest frame the router will look at: header + CRC trailer.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;

/// Command byte bits.
pub mod cmd {
    /// Response type mask (bit 7).
    pub const AUTO_MASK: u8 = 0x80;
    /// Response type value for unsolicited data. Replies echo the
    /// transmit sentinel, so they have bit 7 set.
    pub const AUTO_DATA: u8 = 0x00;
    /// Operation mask (bits 3-2).
    pub const OP_MASK: u8 = 0x0C;
    pub const OP_NOP: u8 = 0x00;
    pub const OP_READ: u8 = 0x04;
    pub const OP_WRITE: u8 = 0x08;
    pub const OP_WRITE_READ: u8 = 0x0C;
    /// Autoincrement destination register.
    pub const AUTOINC: u8 = 0x02;
    /// Sentinel forced into the high nibble on transmit.
    pub const SENTINEL: u8 = 0xF0;
}

/// Sentinel forced into the high nibble of the core byte on transmit.
pub const CORE_SENTINEL: u8 = 0xE0;

/// Operation encoded in bits 3-2 of the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Nop,
    Read,
    Write,
    WriteRead,
}

impl Operation {
    /// Decode the operation bits of a command byte.
    #[must_use]
    pub fn from_cmd(cmd_byte: u8) -> Self {
        match cmd_byte & cmd::OP_MASK {
            cmd::OP_READ => Self::Read,
            cmd::OP_WRITE => Self::Write,
            cmd::OP_WRITE_READ => Self::WriteRead,
            _ => Self::Nop,
        }
    }

    /// Operation bits for a command byte.
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Self::Nop => cmd::OP_NOP,
            Self::Read => cmd::OP_READ,
            Self::Write => cmd::OP_WRITE,
            Self::WriteRead => cmd::OP_WRITE_READ,
        }
    }

    /// True when the board returns data for this operation.
    #[must_use]
    pub fn returns_data(self) -> bool {
        matches!(self, Self::Read | Self::WriteRead)
    }
}

/// Index of a physical core (0..16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreIndex(u8);

impl CoreIndex {
    /// Core 0 always hosts the enumerator.
    pub const ZERO: CoreIndex = CoreIndex(0);

    /// Build a core index, rejecting values outside the image.
    pub fn new(index: usize) -> Result<Self, PacketError> {
        if index < NUM_CORE {
            Ok(Self(index as u8))
        } else {
            Err(PacketError::CoreOutOfRange(index))
        }
    }

    /// Extract the logical core index from a raw core byte.
    ///
    /// The transmit sentinel nibble (`0xE_`) is stripped; any other value
    /// is taken as-is and must be below [`NUM_CORE`].
    pub fn from_wire(raw: u8) -> Result<Self, PacketError> {
        let index = if raw & 0xF0 == CORE_SENTINEL {
            raw & 0x0F
        } else {
            raw
        };
        Self::new(usize::from(index))
    }

    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        usize::from(self.0)
    }

    /// Every core index, in order.
    pub fn all() -> impl Iterator<Item = CoreIndex> {
        (0..NUM_CORE as u8).map(CoreIndex)
    }
}

impl fmt::Display for CoreIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed 4-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub cmd: u8,
    pub core: u8,
    pub reg: u8,
    /// Bytes to transfer (requested bytes for a read).
    pub count: u8,
}

impl PacketHeader {
    #[must_use]
    pub fn new(op: Operation, autoinc: bool, core: CoreIndex, reg: u8, count: u8) -> Self {
        let mut cmd_byte = op.bits();
        if autoinc {
            cmd_byte |= cmd::AUTOINC;
        }
        Self {
            cmd: cmd_byte,
            core: core.0,
            reg,
            count,
        }
    }

    #[inline]
    #[must_use]
    pub fn operation(&self) -> Operation {
        Operation::from_cmd(self.cmd)
    }

    #[inline]
    #[must_use]
    pub fn is_autoinc(&self) -> bool {
        self.cmd & cmd::AUTOINC != 0
    }

    /// True for unsolicited (automatic) data sent by the board.
    #[inline]
    #[must_use]
    pub fn is_auto_data(&self) -> bool {
        self.cmd & cmd::AUTO_MASK == cmd::AUTO_DATA
    }

    /// Force the transmit sentinels into the high nibbles.
    #[inline]
    pub fn apply_sentinels(&mut self) {
        self.cmd |= cmd::SENTINEL;
        self.core |= CORE_SENTINEL;
    }

    #[inline]
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        [self.cmd, self.core, self.reg, self.count]
    }

    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            cmd: bytes[0],
            core: bytes[1],
            reg: bytes[2],
            count: bytes[3],
        }
    }
}

/// A logical packet: header plus payload, without CRC trailer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub header: PacketHeader,
    pub data: Vec<u8>,
}

impl Packet {
    /// A read request: no payload, `count` is the number of bytes wanted.
    #[must_use]
    pub fn read(core: CoreIndex, reg: u8, count: u8) -> Self {
        Self {
            header: PacketHeader::new(Operation::Read, true, core, reg, count),
            data: Vec::new(),
        }
    }

    /// A write request with autoincrement.
    ///
    /// `count` is set from `data`, which must fit the count byte.
    pub fn write(core: CoreIndex, reg: u8, data: &[u8]) -> Result<Self, PacketError> {
        let count = u8::try_from(data.len()).map_err(|_| PacketError::CountOverflow(data.len()))?;
        Ok(Self {
            header: PacketHeader::new(Operation::Write, true, core, reg, count),
            data: data.to_vec(),
        })
    }

    /// Parse a logical packet (CRC already stripped).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::TooShort(bytes.len()));
        }
        if bytes.len() > PC_PKTLEN {
            return Err(PacketError::TooLong(bytes.len()));
        }
        let header = PacketHeader::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self {
            header,
            data: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Header followed by payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.logical_len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Logical length (header + payload).
    #[inline]
    #[must_use]
    pub fn logical_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }

    /// Core the packet is addressed to, sentinel stripped.
    pub fn core_index(&self) -> Result<CoreIndex, PacketError> {
        CoreIndex::from_wire(self.header.core)
    }

    /// For read responses: the trailing "remaining" byte (requested minus
    /// returned) the board appends after the data.
    #[must_use]
    pub fn remaining(&self) -> Option<u8> {
        if self.header.operation().returns_data() {
            self.data.last().copied()
        } else {
            None
        }
    }

    /// For read responses: the returned data without the remaining byte.
    #[must_use]
    pub fn read_data(&self) -> &[u8] {
        match self.remaining() {
            Some(_) => &self.data[..self.data.len() - 1],
            None => &self.data,
        }
    }
}

/// Hex rendering of a byte slice for packet dumps (`" c0 1a e3"`).
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, " {:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_bits() {
        assert_eq!(Operation::from_cmd(0x00), Operation::Nop);
        assert_eq!(Operation::from_cmd(0x04), Operation::Read);
        assert_eq!(Operation::from_cmd(0x08), Operation::Write);
        assert_eq!(Operation::from_cmd(0x0C), Operation::WriteRead);
        // Sentinel and flag bits do not disturb the operation
        assert_eq!(Operation::from_cmd(0xFA), Operation::Write);
        assert_eq!(Operation::from_cmd(0xF2), Operation::Nop);
    }

    #[test]
    fn test_core_from_wire() {
        assert_eq!(CoreIndex::from_wire(0xE3).expect("core").get(), 3);
        assert_eq!(CoreIndex::from_wire(0x0F).expect("core").get(), 15);
        assert_eq!(CoreIndex::from_wire(0xEF).expect("core").get(), 15);
        assert_eq!(
            CoreIndex::from_wire(0x10),
            Err(PacketError::CoreOutOfRange(16))
        );
        assert!(CoreIndex::from_wire(0xF3).is_err());
    }

    #[test]
    fn test_header_sentinels() {
        let mut hdr = PacketHeader::new(
            Operation::Write,
            true,
            CoreIndex::new(3).expect("core"),
            0,
            2,
        );
        assert_eq!(hdr.cmd, 0x0A);
        hdr.apply_sentinels();
        assert_eq!(hdr.to_bytes(), [0xFA, 0xE3, 0x00, 0x02]);
        // Idempotent
        hdr.apply_sentinels();
        assert_eq!(hdr.to_bytes(), [0xFA, 0xE3, 0x00, 0x02]);
    }

    #[test]
    fn test_packet_bytes() {
        let pkt = Packet::write(CoreIndex::new(3).expect("core"), 0, &[0x12, 0x34]).expect("write");
        assert_eq!(pkt.to_bytes(), vec![0x0A, 0x03, 0x00, 0x02, 0x12, 0x34]);
        assert_eq!(Packet::from_bytes(&pkt.to_bytes()).expect("parse"), pkt);
        assert_eq!(Packet::from_bytes(&[1, 2, 3]), Err(PacketError::TooShort(3)));
    }

    #[test]
    fn test_write_count_must_fit() {
        let core = CoreIndex::new(1).expect("core");
        let full = Packet::write(core, 0, &[0xAA; 255]).expect("255 bytes");
        assert_eq!(full.header.count, 255);
        assert_eq!(
            Packet::write(core, 0, &[0xAA; 256]),
            Err(PacketError::CountOverflow(256))
        );
    }

    #[test]
    fn test_read_response_remaining() {
        // read of 4 bytes, board returned 3 and says 1 remains
        let pkt = Packet::from_bytes(&[0x06, 0xE2, 0x10, 0x04, 0xAA, 0xBB, 0xCC, 0x01])
            .expect("parse");
        assert_eq!(pkt.remaining(), Some(1));
        assert_eq!(pkt.read_data(), &[0xAA, 0xBB, 0xCC]);

        let write = Packet::from_bytes(&[0x0A, 0xE2, 0x10, 0x01, 0x55]).expect("parse");
        assert_eq!(write.remaining(), None);
        assert_eq!(write.read_data(), &[0x55]);
    }

    #[test]
    fn test_auto_data_bit() {
        assert!(PacketHeader::from_bytes([0x04, 0x01, 0x40, 0x20]).is_auto_data());
        assert!(!PacketHeader::from_bytes([0xF6, 0xE0, 0x40, 0x20]).is_auto_data());
    }

    #[test]
    fn test_hexdump() {
        assert_eq!(HexDump(&[0xC0, 0x1A, 0x00]).to_string(), " c0 1a 00");
        assert_eq!(HexDump(&[]).to_string(), "");
    }
}
