// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLIP framing of packets on the byte-serial link.
//!
//! # Wire Format
//!
//! ```text
//! END | escaped(header[4] + payload[0..count] + crc16[2]) | END
//! ```
//!
//! | Byte | Value | Meaning |
//! |------|-------|---------|
//! | `END` | 0xC0 | frame delimiter (start and end) |
//! | `ESC` | 0xDB | escape introducer |
//! | `ESC_END` | 0xDC | `ESC ESC_END` stands for a literal 0xC0 |
//! | `ESC_ESC` | 0xDD | `ESC ESC_ESC` stands for a literal 0xDB |
//!
//! The encoder is a pure function. The decoder is a streaming state machine:
//! reads of any size are fed in as they arrive and complete frames come out,
//! with partial frames carried over to the next read.

use std::io;

use crate::crc::{crc16_xmodem, CRC_LEN};
use crate::error::FrameError;
use crate::packet::{HexDump, PC_PKTLEN};

/// Frame delimiter.
pub const SLIP_END: u8 = 0xC0;
/// Escape introducer.
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped delimiter marker.
pub const ESC_END: u8 = 0xDC;
/// Escaped escape marker.
pub const ESC_ESC: u8 = 0xDD;

/// Largest decoded frame (logical packet + CRC) the decoder will accumulate.
pub const MAX_DECODED_LEN: usize = PC_PKTLEN + CRC_LEN;

/// Worst-case encoded size: every byte escaped, plus two delimiters.
pub const MAX_ENCODED_LEN: usize = 2 * MAX_DECODED_LEN + 2;

/// Default receive accumulation buffer size.
pub const RXBUF_SZ: usize = 4000;

#[inline]
fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    match byte {
        SLIP_END => out.extend_from_slice(&[SLIP_ESC, ESC_END]),
        SLIP_ESC => out.extend_from_slice(&[SLIP_ESC, ESC_ESC]),
        b => out.push(b),
    }
}

/// Frame a logical packet (header + payload) onto `out`.
///
/// Appends the big-endian CRC-16/XMODEM of `logical`, escapes everything,
/// and wraps it in delimiters.
///
/// # Returns
///
/// Number of bytes appended to `out`.
pub fn encode_frame(logical: &[u8], out: &mut Vec<u8>) -> Result<usize, FrameError> {
    if logical.len() > PC_PKTLEN {
        return Err(FrameError::TooLarge {
            len: logical.len(),
            max: PC_PKTLEN,
        });
    }

    let start = out.len();
    let crc = crc16_xmodem(logical).to_be_bytes();

    out.push(SLIP_END);
    for &byte in logical.iter().chain(crc.iter()) {
        push_escaped(out, byte);
    }
    out.push(SLIP_END);

    Ok(out.len() - start)
}

/// Encoded size of `logical` without encoding it.
#[must_use]
pub fn encoded_len(logical: &[u8]) -> usize {
    let crc = crc16_xmodem(logical).to_be_bytes();
    let escapes = logical
        .iter()
        .chain(crc.iter())
        .filter(|&&b| b == SLIP_END || b == SLIP_ESC)
        .count();
    logical.len() + CRC_LEN + escapes + 2
}

// ============================================================================
// Receive buffer
// ============================================================================

/// Bounded accumulation buffer for raw link reads.
///
/// Reads append at the tail; the decoder consumes from the head.
#[derive(Debug)]
pub struct RxBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl RxBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes buffered and not yet consumed.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Free space left for the next read.
    #[inline]
    #[must_use]
    pub fn spare(&self) -> usize {
        self.capacity - self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Append as much of `data` as fits; returns the number of bytes taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.spare());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Fill the spare space with one call to `read`.
    ///
    /// The buffer is left unchanged when `read` fails.
    pub fn read_with<F>(&mut self, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let start = self.buf.len();
        self.buf.resize(self.capacity, 0);
        match read(&mut self.buf[start..]) {
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Drop the first `n` bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }
}

// ============================================================================
// Streaming decoder
// ============================================================================

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Initial state: zero fill bytes before the first frame are dropped.
    SkippingLeadingFill,
    /// Accumulating frame bytes.
    InPacket,
    /// Previous byte was `ESC`.
    InEscape,
}

/// Framing violations. Each one resynchronizes the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// `ESC` outside a packet, or `ESC ESC`.
    UnexpectedEscape,
    /// `END` right after `ESC`.
    DelimiterInEscape,
    /// `ESC` followed by something other than `ESC_END`/`ESC_ESC`.
    BadEscape(u8),
    /// Frame grew past [`MAX_DECODED_LEN`] without a delimiter.
    Overrun,
}

/// Decoder counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecoderStats {
    /// Non-empty frames handed to the caller.
    pub frames: u64,
    /// Framing violations (each followed by a resync).
    pub violations: u64,
    /// Leading zero fill bytes dropped.
    pub fill_bytes_skipped: u64,
}

/// Streaming SLIP decoder.
#[derive(Debug)]
pub struct SlipDecoder {
    state: DecoderState,
    frame: Vec<u8>,
    stats: DecoderStats,
    last_violation: Option<Violation>,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecoderState::SkippingLeadingFill,
            frame: Vec::with_capacity(MAX_DECODED_LEN),
            stats: DecoderStats::default(),
            last_violation: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Most recent framing violation, if any.
    #[inline]
    #[must_use]
    pub fn last_violation(&self) -> Option<Violation> {
        self.last_violation
    }

    /// Bytes of the frame currently being accumulated.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.frame
    }

    /// Decode everything buffered in `rx`, then consume it.
    ///
    /// A trailing partial frame stays in the decoder and is completed by
    /// later reads.
    pub fn decode_buffer<F>(&mut self, rx: &mut RxBuffer, on_frame: F)
    where
        F: FnMut(&[u8]),
    {
        let n = rx.len();
        self.decode(rx.as_slice(), on_frame);
        rx.consume(n);
    }

    /// Feed raw link bytes; `on_frame` is called once per complete,
    /// non-empty frame, in arrival order.
    pub fn decode<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(&[u8]),
    {
        for &byte in bytes {
            self.step(byte, &mut on_frame);
        }
    }

    /// Convenience wrapper collecting frames into owned buffers.
    pub fn decode_to_vec(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        self.decode(bytes, |f| frames.push(f.to_vec()));
        frames
    }

    fn step<F>(&mut self, byte: u8, on_frame: &mut F)
    where
        F: FnMut(&[u8]),
    {
        match (self.state, byte) {
            (DecoderState::InPacket, SLIP_END) => {
                if !self.frame.is_empty() {
                    self.stats.frames += 1;
                    on_frame(&self.frame);
                    self.frame.clear();
                }
            }
            (DecoderState::SkippingLeadingFill, SLIP_END) => {
                tracing::debug!("skipping empty leading frame");
                self.state = DecoderState::InPacket;
            }
            (DecoderState::InEscape, SLIP_END) => self.violation(Violation::DelimiterInEscape),

            (DecoderState::InPacket, SLIP_ESC) => self.state = DecoderState::InEscape,
            (_, SLIP_ESC) => self.violation(Violation::UnexpectedEscape),

            (DecoderState::InEscape, ESC_END) => self.accept(SLIP_END),
            (DecoderState::InEscape, ESC_ESC) => self.accept(SLIP_ESC),
            (DecoderState::InEscape, other) => self.violation(Violation::BadEscape(other)),

            (DecoderState::SkippingLeadingFill, 0x00) => {
                tracing::debug!("skipping zero byte");
                self.stats.fill_bytes_skipped += 1;
            }
            (DecoderState::SkippingLeadingFill, other) | (DecoderState::InPacket, other) => {
                self.accept(other);
            }
        }
    }

    #[inline]
    fn accept(&mut self, byte: u8) {
        if self.frame.len() >= MAX_DECODED_LEN {
            self.violation(Violation::Overrun);
            return;
        }
        self.frame.push(byte);
        self.state = DecoderState::InPacket;
    }

    fn violation(&mut self, kind: Violation) {
        tracing::warn!(
            violation = ?kind,
            discarded = self.frame.len(),
            "SLIP protocol error on link, resynchronizing"
        );
        tracing::trace!("<X{}", HexDump(&self.frame));
        self.stats.violations += 1;
        self.last_violation = Some(kind);
        self.frame.clear();
        self.state = DecoderState::InPacket;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::frame_crc_ok;

    fn encode(logical: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(logical, &mut out).expect("encode");
        out
    }

    #[test]
    fn test_encode_plain() {
        let out = encode(&[0x0A, 0x03, 0x00, 0x02, 0x12, 0x34]);
        assert_eq!(out[0], SLIP_END);
        assert_eq!(*out.last().expect("end"), SLIP_END);
        assert!(frame_crc_ok(&out[1..out.len() - 1]));
    }

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        let logical = [SLIP_END, SLIP_ESC, SLIP_ESC, SLIP_END];
        let out = encode(&logical);
        assert_eq!(
            &out[..9],
            &[SLIP_END, SLIP_ESC, ESC_END, SLIP_ESC, ESC_ESC, SLIP_ESC, ESC_ESC, SLIP_ESC, ESC_END]
        );
        assert_eq!(out.len(), encoded_len(&logical));
    }

    #[test]
    fn test_encode_length_formula() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..200 {
            let len = rng.usize(4..64);
            let logical: Vec<u8> = (0..len)
                .map(|_| match rng.u8(0..4) {
                    0 => SLIP_END,
                    1 => SLIP_ESC,
                    _ => rng.u8(..),
                })
                .collect();
            let crc = crc16_xmodem(&logical).to_be_bytes();
            let specials = logical
                .iter()
                .chain(crc.iter())
                .filter(|&&b| b == SLIP_END || b == SLIP_ESC)
                .count();
            let out = encode(&logical);
            assert_eq!(out.len(), logical.len() + CRC_LEN + specials + 2);
        }
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let logical = vec![0u8; PC_PKTLEN + 1];
        let mut out = Vec::new();
        assert_eq!(
            encode_frame(&logical, &mut out),
            Err(FrameError::TooLarge {
                len: PC_PKTLEN + 1,
                max: PC_PKTLEN
            })
        );
        assert!(out.is_empty(), "nothing emitted on failure");

        let logical = vec![0u8; PC_PKTLEN];
        assert!(encode_frame(&logical, &mut out).is_ok());
    }

    #[test]
    fn test_decode_roundtrip_with_escapes() {
        let logical = vec![0x0A, 0xE3, SLIP_END, 0x04, SLIP_ESC, SLIP_END, SLIP_ESC, 0x00];
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&encode(&logical));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..logical.len()], &logical[..]);
        assert!(frame_crc_ok(&frames[0]));
        assert_eq!(dec.stats().violations, 0);
    }

    #[test]
    fn test_leading_zero_fill_skipped() {
        let mut stream = vec![0x00, 0x00, 0x00];
        stream.extend(encode(&[0x0A, 0xE1, 0x00, 0x00]));
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(dec.stats().fill_bytes_skipped, 3);
    }

    #[test]
    fn test_zero_fill_only_skipped_before_first_frame() {
        let mut dec = SlipDecoder::new();
        dec.decode_to_vec(&encode(&[0x0A, 0xE1, 0x00, 0x00]));
        assert_eq!(dec.state(), DecoderState::InPacket);

        // After the first frame a zero is ordinary frame data.
        let frames = dec.decode_to_vec(&[0x00, SLIP_END]);
        assert_eq!(frames, vec![vec![0x00]]);
        assert_eq!(dec.stats().fill_bytes_skipped, 0);
    }

    #[test]
    fn test_first_byte_without_delimiter_starts_frame() {
        let logical = [0x0A, 0xE1, 0x00, 0x00];
        let encoded = encode(&logical);
        // Drop the opening delimiter: the first data byte opens the frame.
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&encoded[1..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..4], &logical);
    }

    #[test]
    fn test_back_to_back_frames_share_delimiter() {
        let a = encode(&[0x0A, 0xE1, 0x00, 0x00]);
        let b = encode(&[0x0A, 0xE2, 0x00, 0x00]);
        // ...END][END... and ...END][... (shared delimiter) both work
        let mut joined = a.clone();
        joined.extend_from_slice(&b[1..]);
        let mut doubled = a;
        doubled.extend_from_slice(&b);

        for stream in [joined, doubled] {
            let mut dec = SlipDecoder::new();
            let frames = dec.decode_to_vec(&stream);
            assert_eq!(frames.len(), 2);
            assert_eq!(frames[0][1], 0xE1);
            assert_eq!(frames[1][1], 0xE2);
        }
    }

    #[test]
    fn test_partial_frame_carried_across_reads() {
        let encoded = encode(&[0x0A, 0xE5, SLIP_ESC, 0x01, 0x99]);
        let mut dec = SlipDecoder::new();
        let mut frames = Vec::new();
        for byte in &encoded {
            frames.extend(dec.decode_to_vec(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..5], &[0x0A, 0xE5, SLIP_ESC, 0x01, 0x99]);
    }

    #[test]
    fn test_escape_outside_packet_resyncs() {
        let good = encode(&[0x0A, 0xE1, 0x00, 0x00]);
        let mut stream = vec![SLIP_ESC];
        stream.extend_from_slice(&good);

        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&stream);
        assert_eq!(dec.stats().violations, 1);
        assert_eq!(dec.last_violation(), Some(Violation::UnexpectedEscape));
        assert_eq!(frames.len(), 1);
        assert!(frame_crc_ok(&frames[0]));
    }

    #[test]
    fn test_double_escape_resyncs() {
        let good = encode(&[0x0A, 0xE1, 0x00, 0x00]);
        let mut stream = vec![SLIP_END, 0x11, SLIP_ESC, SLIP_ESC, 0x22];
        stream.extend_from_slice(&good);

        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&stream);
        assert_eq!(dec.stats().violations, 1);
        // The stray 0x22 becomes its own (invalid) frame, the good one follows.
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![0x22]);
        assert!(frame_crc_ok(&frames[1]));
    }

    #[test]
    fn test_delimiter_in_escape_resyncs() {
        let good = encode(&[0x0A, 0xE1, 0x00, 0x00]);
        let mut stream = vec![SLIP_END, 0x11, SLIP_ESC];
        stream.extend_from_slice(&good);

        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&stream);
        assert_eq!(dec.last_violation(), Some(Violation::DelimiterInEscape));
        assert_eq!(frames.len(), 1);
        assert!(frame_crc_ok(&frames[0]));
    }

    #[test]
    fn test_bad_escape_resyncs() {
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&[SLIP_END, 0x11, SLIP_ESC, 0x42, 0x33, SLIP_END]);
        assert_eq!(dec.last_violation(), Some(Violation::BadEscape(0x42)));
        assert_eq!(frames, vec![vec![0x33]]);
    }

    #[test]
    fn test_overrun_resyncs() {
        let mut stream = vec![SLIP_END];
        stream.extend(std::iter::repeat(0x55).take(MAX_DECODED_LEN + 10));
        stream.push(SLIP_END);
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&stream);
        assert_eq!(dec.last_violation(), Some(Violation::Overrun));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].len() < MAX_DECODED_LEN);
    }

    #[test]
    fn test_empty_frames_ignored() {
        let mut dec = SlipDecoder::new();
        let frames = dec.decode_to_vec(&[SLIP_END, SLIP_END, SLIP_END, SLIP_END]);
        assert!(frames.is_empty());
        assert_eq!(dec.stats().frames, 0);
    }

    #[test]
    fn test_rx_buffer_read_and_consume() {
        let mut rx = RxBuffer::new(8);
        let n = rx
            .read_with(|buf| {
                buf[..3].copy_from_slice(&[1, 2, 3]);
                Ok(3)
            })
            .expect("read");
        assert_eq!(n, 3);
        assert_eq!(rx.as_slice(), &[1, 2, 3]);
        assert_eq!(rx.spare(), 5);

        let err = rx.read_with(|_| Err(io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(err.is_err());
        assert_eq!(rx.len(), 3, "failed read leaves buffer untouched");

        rx.consume(2);
        assert_eq!(rx.as_slice(), &[3]);
        assert_eq!(rx.extend(&[9; 20]), 7);
        assert_eq!(rx.spare(), 0);
        rx.consume(100);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_decode_buffer_consumes_everything() {
        let encoded = encode(&[0x0A, 0xE1, 0x00, 0x00]);
        let mut rx = RxBuffer::new(RXBUF_SZ);
        rx.extend(&encoded[..5]);

        let mut dec = SlipDecoder::new();
        let mut count = 0;
        dec.decode_buffer(&mut rx, |_| count += 1);
        assert_eq!(count, 0);
        assert!(rx.is_empty());
        assert!(!dec.pending().is_empty());

        rx.extend(&encoded[5..]);
        dec.decode_buffer(&mut rx, |_| count += 1);
        assert_eq!(count, 1);
        assert!(dec.pending().is_empty());
    }
}
