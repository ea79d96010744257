// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use pclink::crc::append_crc16;
use pclink::validate_frame;

fuzz_target!(|data: &[u8]| {
    // Raw frame, CRC almost always wrong
    if let Ok(accepted) = validate_frame(data) {
        assert_eq!(accepted.logical.len() + 2, data.len());
    }

    // Same bytes with a correct trailer reach the header checks
    let mut framed = data.to_vec();
    append_crc16(&mut framed);
    if let Ok(accepted) = validate_frame(&framed) {
        assert_eq!(accepted.logical, data);
        assert!(accepted.core.get() < 16);
    }
});
