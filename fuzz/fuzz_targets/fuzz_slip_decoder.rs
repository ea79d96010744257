// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use pclink::frame::{SlipDecoder, MAX_DECODED_LEN};

fuzz_target!(|data: &[u8]| {
    // First byte picks the read size, the rest is line traffic
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut decoder = SlipDecoder::new();
    for piece in stream.chunks(chunk) {
        decoder.decode(piece, |frame| {
            assert!(!frame.is_empty());
            assert!(frame.len() <= MAX_DECODED_LEN);
        });
    }

    // Fragmentation must not change the result
    let whole = SlipDecoder::new().decode_to_vec(stream);
    let mut split = SlipDecoder::new();
    let mut frames = Vec::new();
    for piece in stream.chunks(chunk) {
        frames.extend(split.decode_to_vec(piece));
    }
    assert_eq!(whole, frames);
});
