// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::cast_possible_truncation)] // Test data conversions

//! Decoder behaviour under arbitrary read fragmentation.
//!
//! Test scenarios:
//! - Every two-way split point of a multi-frame stream
//! - One byte per read
//! - Random chunk sizes (seeded)
//! - Fragmented reads through the engine's receive buffer

mod common;

use common::{board_frame, write_packet, Harness};
use pclink::{crc16_xmodem, CoreIndex, DaemonConfig, SlipDecoder, SlotId};

/// Logical packets with payloads exercising both reserved bytes.
fn sample_packets(rng: &mut fastrand::Rng, n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| {
            let len = rng.usize(0..40);
            let mut data: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
            if i % 2 == 0 {
                data.extend_from_slice(&[0xC0, 0xC0, 0xDB, 0xDB, 0xC0]);
            }
            write_packet((i % 16) as u8, i as u8, &data)
        })
        .collect()
}

/// Decoded frames are the logical packet followed by its CRC.
fn expected_frames(packets: &[Vec<u8>]) -> Vec<Vec<u8>> {
    packets
        .iter()
        .map(|p| {
            let mut f = p.clone();
            f.extend_from_slice(&crc16_xmodem(p).to_be_bytes());
            f
        })
        .collect()
}

fn stream(packets: &[Vec<u8>]) -> Vec<u8> {
    packets.iter().flat_map(|p| board_frame(p)).collect()
}

fn decode_chunks<'a>(chunks: impl Iterator<Item = &'a [u8]>) -> Vec<Vec<u8>> {
    let mut decoder = SlipDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        decoder.decode(chunk, |f| frames.push(f.to_vec()));
    }
    assert_eq!(decoder.stats().violations, 0);
    frames
}

#[test]
fn test_every_split_point() {
    let mut rng = fastrand::Rng::with_seed(0x5EED);
    let packets = sample_packets(&mut rng, 4);
    let expected = expected_frames(&packets);
    let wire = stream(&packets);

    for split in 0..=wire.len() {
        let (a, b) = wire.split_at(split);
        let frames = decode_chunks([a, b].into_iter());
        assert_eq!(frames, expected, "split at {}", split);
    }
}

#[test]
fn test_one_byte_per_read() {
    let mut rng = fastrand::Rng::with_seed(7);
    let packets = sample_packets(&mut rng, 8);
    let wire = stream(&packets);

    let frames = decode_chunks(wire.chunks(1));
    assert_eq!(frames, expected_frames(&packets));
}

#[test]
fn test_random_chunks() {
    let mut rng = fastrand::Rng::with_seed(0xC0DB);
    for _ in 0..50 {
        let n = rng.usize(1..12);
        let packets = sample_packets(&mut rng, n);
        let wire = stream(&packets);

        let mut chunks = Vec::new();
        let mut rest = wire.as_slice();
        while !rest.is_empty() {
            let take = rng.usize(1..=rest.len().min(64));
            let (head, tail) = rest.split_at(take);
            chunks.push(head);
            rest = tail;
        }
        let frames = decode_chunks(chunks.into_iter());
        assert_eq!(frames, expected_frames(&packets));
    }
}

#[test]
fn test_fragmented_link_reads_through_engine() {
    for chunk in [1, 2, 3, 7, 64] {
        let mut h = Harness::new(&DaemonConfig::default(), &["rec"]);
        for c in 0..16 {
            let core = CoreIndex::new(c).expect("core");
            h.engine
                .install(SlotId::new(c + 1), "rec", Some(core), &mut h.sink, h.t0)
                .expect("install");
        }

        let mut rng = fastrand::Rng::with_seed(chunk as u64);
        let packets = sample_packets(&mut rng, 10);
        h.link.set_read_chunk(Some(chunk));
        h.link.push_rx(&stream(&packets));
        h.engine.poll_link(&mut h.sink, h.t0).expect("poll");

        let seen: Vec<Vec<u8>> = h.take_seen().iter().map(|(_, p)| p.to_bytes()).collect();
        assert_eq!(seen, packets, "chunk size {}", chunk);
        assert_eq!(h.engine.stats().packets_routed, packets.len() as u64);
    }
}
