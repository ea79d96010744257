// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CRC-16/XMODEM checksum for packet integrity.
//!
//! Every packet carried on the link ends with a 2-byte big-endian trailer
//! holding the CRC of the header and payload. Because the CRC has no final
//! XOR, running it over the packet *including* its trailer yields zero, and
//! that is how received frames are validated.
//!
//! # Parameters (CRC-16/XMODEM)
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | Polynomial | 0x1021 |
//! | Init | 0x0000 |
//! | RefIn | false |
//! | RefOut | false |
//! | XorOut | 0x0000 |
//!
//! # Test Vector
//!
//! ```
//! use pclink::crc::crc16_xmodem;
//!
//! // Standard test vector: "123456789" -> 0x31C3
//! assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
//! ```

/// Length of the CRC trailer on the wire.
pub const CRC_LEN: usize = 2;

/// Initial value for CRC calculation.
const INIT: u16 = 0x0000;

/// Update an existing CRC with more data.
///
/// Nibble-folded form of the 0x1021 polynomial; one step per byte,
/// no lookup table.
#[inline]
#[must_use]
pub fn crc16_xmodem_update(crc: u16, data: &[u8]) -> u16 {
    let mut crc = crc;
    for &byte in data {
        let mut x = ((crc >> 8) as u8) ^ byte;
        x ^= x >> 4;
        let x = u16::from(x);
        crc = (crc << 8) ^ (x << 12) ^ (x << 5) ^ x;
    }
    crc
}

/// Calculate the CRC-16/XMODEM checksum of `data`.
#[inline]
#[must_use]
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    crc16_xmodem_update(INIT, data)
}

/// Append the big-endian CRC of `buf` to `buf`.
#[inline]
pub fn append_crc16(buf: &mut Vec<u8>) {
    let crc = crc16_xmodem(buf);
    buf.extend_from_slice(&crc.to_be_bytes());
}

/// Check a frame whose last two bytes are its CRC trailer.
///
/// Valid iff the CRC over the whole frame, trailer included, is zero.
#[inline]
#[must_use]
pub fn frame_crc_ok(frame: &[u8]) -> bool {
    frame.len() >= CRC_LEN && crc16_xmodem(frame) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference bitwise implementation (MSB-first shift register).
    fn crc16_bitwise(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            crc ^= u16::from(byte) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_crc16_standard_vector() {
        assert_eq!(
            crc16_xmodem(b"123456789"),
            0x31C3,
            "Standard test vector must produce 0x31C3"
        );
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16_xmodem(&[]), 0x0000);
    }

    #[test]
    fn test_matches_bitwise_reference() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for len in 0..64 {
            let data: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
            assert_eq!(crc16_xmodem(&data), crc16_bitwise(&data), "len {}", len);
        }
    }

    #[test]
    fn test_crc16_incremental() {
        let data = b"123456789";
        let mut incremental = INIT;
        for chunk in data.chunks(2) {
            incremental = crc16_xmodem_update(incremental, chunk);
        }
        assert_eq!(incremental, crc16_xmodem(data));
    }

    #[test]
    fn test_trailer_makes_crc_zero() {
        let mut rng = fastrand::Rng::with_seed(42);
        for len in 0..80 {
            let mut buf: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
            append_crc16(&mut buf);
            assert_eq!(crc16_xmodem(&buf), 0, "len {}", len);
            assert!(frame_crc_ok(&buf));
        }
    }

    #[test]
    fn test_append_is_big_endian() {
        let mut buf = b"123456789".to_vec();
        append_crc16(&mut buf);
        assert_eq!(&buf[9..], &[0x31, 0xC3]);
    }

    #[test]
    fn test_detects_single_bit_flip() {
        let mut buf = vec![0x1A, 0xE3, 0x00, 0x02, 0x12, 0x34];
        append_crc16(&mut buf);
        for i in 0..buf.len() {
            for bit in 0..8 {
                buf[i] ^= 1 << bit;
                assert!(!frame_crc_ok(&buf), "flip at byte {} bit {}", i, bit);
                buf[i] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn test_frame_too_short_for_trailer() {
        assert!(!frame_crc_ok(&[]));
        assert!(!frame_crc_ok(&[0x00]));
        // Two zero bytes form a (degenerate) valid trailer over nothing.
        assert!(frame_crc_ok(&[0x00, 0x00]));
    }
}
