// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use std::time::{Duration, Instant};

use libfuzzer_sys::fuzz_target;
use pclink::{DaemonConfig, DriverFactory, Engine, MemoryLink, RecordingSink};

fuzz_target!(|data: &[u8]| {
    let link = MemoryLink::new();
    let mut engine = Engine::new(
        &DaemonConfig::default(),
        Box::new(link.clone()),
        DriverFactory::new(),
    );
    let mut sink = RecordingSink::new();
    let t0 = Instant::now();
    if engine.start(&mut sink, t0).is_err() {
        return;
    }

    link.push_rx(data);
    let _ = engine.poll_link(&mut sink, t0);
    engine.poll_timers(&mut sink, t0 + Duration::from_secs(1));

    let stats = engine.stats();
    assert!(stats.packets_accepted >= stats.packets_routed);
});
