// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use pclink::{
    encode_frame, DaemonConfig, Driver, DriverContext, DriverFactory, Engine, MemoryLink, Packet,
    RecordingSink, SlotId,
};

/// Packets seen by [`Recorder`] drivers, tagged with their slot.
pub type Seen = Arc<Mutex<Vec<(SlotId, Packet)>>>;

/// Driver that records every packet it receives.
pub struct Recorder {
    seen: Seen,
}

impl Driver for Recorder {
    fn on_packet(&mut self, ctx: &mut DriverContext<'_>, packet: &Packet) {
        self.seen
            .lock()
            .expect("seen")
            .push((ctx.slot_id(), packet.clone()));
    }
}

/// Factory where every name in `names` builds a [`Recorder`].
pub fn recorder_factory(names: &[&str], seen: &Seen) -> DriverFactory {
    let mut factory = DriverFactory::new();
    for name in names {
        let seen = seen.clone();
        factory.register(*name, move || Box::new(Recorder { seen: seen.clone() }));
    }
    factory
}

pub struct Harness {
    pub link: MemoryLink,
    pub engine: Engine,
    pub sink: RecordingSink,
    pub seen: Seen,
    pub t0: Instant,
}

impl Harness {
    pub fn new(config: &DaemonConfig, names: &[&str]) -> Self {
        let seen = Seen::default();
        let link = MemoryLink::new();
        let engine = Engine::new(
            config,
            Box::new(link.clone()),
            recorder_factory(names, &seen),
        );
        Self {
            link,
            engine,
            sink: RecordingSink::new(),
            seen,
            t0: Instant::now(),
        }
    }

    /// Packets recorded so far, draining the list.
    pub fn take_seen(&self) -> Vec<(SlotId, Packet)> {
        std::mem::take(&mut *self.seen.lock().expect("seen"))
    }
}

/// Wire bytes for a logical packet, as the board would send it.
pub fn board_frame(logical: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    encode_frame(logical, &mut wire).expect("encode");
    wire
}

/// Logical write packet `{cmd, core, reg, count, data}`.
pub fn write_packet(core: u8, reg: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x08, core, reg, data.len() as u8];
    out.extend_from_slice(data);
    out
}
