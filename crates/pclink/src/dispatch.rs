// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Validation of decoded frames before they reach a driver.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. at least header + CRC (6 bytes)
//! 2. CRC over the whole frame, trailer included, is zero
//! 3. the command carries a real operation (not no-op)
//! 4. the core index is inside the image
//! 5. for reads: the trailing "remaining" byte equals requested minus
//!    returned, where returned = frame length - 7 (header, remaining byte,
//!    CRC)
//!
//! Write responses get checks 1-4 only.

use crate::crc::{frame_crc_ok, CRC_LEN};
use crate::error::PacketError;
use crate::packet::{cmd, CoreIndex, Operation, MIN_FRAME_LEN};
use crate::registry::SlotId;

/// Header, remaining byte and CRC: the read-response overhead.
const READ_OVERHEAD: usize = MIN_FRAME_LEN + 1;

/// A frame that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted<'a> {
    /// Core the packet came from.
    pub core: CoreIndex,
    /// Header + payload, CRC stripped.
    pub logical: &'a [u8],
}

/// Validate a decoded frame (header + payload + CRC).
pub fn validate_frame(frame: &[u8]) -> Result<Accepted<'_>, PacketError> {
    let len = frame.len();
    if len < MIN_FRAME_LEN {
        return Err(PacketError::TooShort(len));
    }
    if !frame_crc_ok(frame) {
        return Err(PacketError::CrcMismatch);
    }

    let cmd_byte = frame[0];
    if Operation::from_cmd(cmd_byte) == Operation::Nop {
        return Err(PacketError::NoOperation(cmd_byte));
    }

    let core = CoreIndex::from_wire(frame[1])?;

    // Write-read responses carry the read bit too.
    if cmd_byte & cmd::OP_READ != 0 {
        let requested = usize::from(frame[3]);
        let returned = len as isize - READ_OVERHEAD as isize;
        let remaining = usize::from(frame[len - 3]);
        if remaining as isize != requested as isize - returned {
            return Err(PacketError::ReadCountMismatch {
                requested,
                returned,
                remaining,
            });
        }
    }

    Ok(Accepted {
        core,
        logical: &frame[..len - CRC_LEN],
    })
}

/// What became of one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteStatus {
    /// Handed to the driver in this slot.
    Delivered(SlotId),
    /// Valid, but no driver is registered for the core.
    Unrouted(CoreIndex),
    /// Failed validation and was dropped.
    Rejected(PacketError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::append_crc16;

    fn framed(logical: &[u8]) -> Vec<u8> {
        let mut frame = logical.to_vec();
        append_crc16(&mut frame);
        frame
    }

    #[test]
    fn test_accepts_write_response() {
        let frame = framed(&[0xFA, 0xE3, 0x00, 0x02, 0x12, 0x34]);
        let accepted = validate_frame(&frame).expect("valid");
        assert_eq!(accepted.core.get(), 3);
        assert_eq!(accepted.logical, &[0xFA, 0xE3, 0x00, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_rejects_short() {
        for len in 0..MIN_FRAME_LEN {
            let frame = vec![0u8; len];
            assert_eq!(validate_frame(&frame), Err(PacketError::TooShort(len)));
        }
    }

    #[test]
    fn test_rejects_bad_crc() {
        let mut frame = framed(&[0x0A, 0x03, 0x00, 0x02, 0x12, 0x34]);
        frame[4] ^= 0x01;
        assert_eq!(validate_frame(&frame), Err(PacketError::CrcMismatch));
    }

    #[test]
    fn test_rejects_nop() {
        let frame = framed(&[0xF0, 0xE3, 0x00, 0x00]);
        assert_eq!(validate_frame(&frame), Err(PacketError::NoOperation(0xF0)));
    }

    #[test]
    fn test_rejects_core_16() {
        let frame = framed(&[0x08, 0x10, 0x00, 0x00]);
        assert_eq!(validate_frame(&frame), Err(PacketError::CoreOutOfRange(16)));
    }

    #[test]
    fn test_read_response_counts() {
        // asked for 4, got 3, 1 remaining
        let ok = framed(&[0x06, 0xE2, 0x10, 0x04, 0xAA, 0xBB, 0xCC, 0x01]);
        assert!(validate_frame(&ok).is_ok());

        // asked for 4, got all 4
        let full = framed(&[0x06, 0xE2, 0x10, 0x04, 1, 2, 3, 4, 0x00]);
        assert!(validate_frame(&full).is_ok());

        // claims 2 remaining but only 1 is missing
        let bad = framed(&[0x06, 0xE2, 0x10, 0x04, 0xAA, 0xBB, 0xCC, 0x02]);
        assert_eq!(
            validate_frame(&bad),
            Err(PacketError::ReadCountMismatch {
                requested: 4,
                returned: 3,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_read_without_remaining_byte_rejected() {
        let frame = framed(&[0x06, 0xE2, 0x10, 0x00]);
        assert!(matches!(
            validate_frame(&frame),
            Err(PacketError::ReadCountMismatch { returned: -1, .. })
        ));
    }

    #[test]
    fn test_write_read_checks_remaining() {
        let bad = framed(&[0x0E, 0xE2, 0x10, 0x02, 0xAA, 0x05]);
        assert!(matches!(
            validate_frame(&bad),
            Err(PacketError::ReadCountMismatch { .. })
        ));
        let ok = framed(&[0x0E, 0xE2, 0x10, 0x02, 0xAA, 0x01]);
        assert!(validate_frame(&ok).is_ok());
    }

    #[test]
    fn test_write_response_not_count_checked() {
        // count says 9 but only 1 data byte; writes stay permissive
        let frame = framed(&[0x08, 0xE2, 0x10, 0x09, 0xAA]);
        assert!(validate_frame(&frame).is_ok());
    }

    #[test]
    fn test_check_order() {
        // Bad CRC wins over no-op and bad core.
        let mut frame = framed(&[0x00, 0x1F, 0x00, 0x00]);
        frame[5] ^= 0xFF;
        assert_eq!(validate_frame(&frame), Err(PacketError::CrcMismatch));

        // No-op wins over bad core.
        let frame = framed(&[0x00, 0x1F, 0x00, 0x00]);
        assert_eq!(validate_frame(&frame), Err(PacketError::NoOperation(0x00)));
    }
}
