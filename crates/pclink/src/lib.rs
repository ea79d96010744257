// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pclink - transport and dispatch core for an FPGA peripheral daemon
//!
//! Carries framed, CRC-protected packets between the host and an FPGA board
//! over a byte-serial link, and routes them to the driver bound to each of
//! the board's 16 peripheral cores.
//!
//! # Features
//!
//! - **Framing**: SLIP encoder and a streaming decoder that survives
//!   fragmented reads and resynchronizes after violations
//! - **Integrity**: CRC-16/XMODEM trailer on every packet
//! - **Routing**: header validation and per-core dispatch to [`Driver`]s
//! - **Registry**: cores, driver slots and resources with an async-reply
//!   lock and broadcast subscriptions
//! - **Timers**: one-shot and periodic timers for missing-ack detection
//! - **Enumeration**: the built-in [`Enumerator`] reads the board's driver
//!   table and loads drivers from a [`DriverFactory`]
//!
//! # Wire format
//!
//! ```text
//! 0xC0 | escaped(cmd core reg count payload[count] crc16_be) | 0xC0
//! ```
//!
//! `0xC0` inside a frame becomes `0xDB 0xDC`, `0xDB` becomes `0xDB 0xDD`.
//!
//! # Configuration File
//!
//! ```toml
//! serial_port = "/dev/ttyUSB0"
//! ack_timeout_ms = 100
//! trace_packets = false
//!
//! [[overload]]
//! slot = 3
//! driver = "out4"
//! ```

pub mod catalog;
pub mod config;
pub mod crc;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod frame;
pub mod link;
pub mod packet;
pub mod registry;
pub mod resource;
pub mod session;
pub mod stats;
pub mod timer;
pub mod transmit;

pub use catalog::PeripheralDesc;
pub use config::{DaemonConfig, Overload};
pub use crc::{crc16_xmodem, frame_crc_ok};
pub use dispatch::{validate_frame, Accepted, RouteStatus};
pub use driver::{Driver, DriverContext, DriverFactory, Request, RequestOutcome};
pub use engine::Engine;
pub use enumerator::Enumerator;
pub use error::{
    ConfigError, Error, FrameError, LinkError, PacketError, RegistryError, Result, TimerError,
    TxError,
};
pub use frame::{encode_frame, DecoderState, RxBuffer, SlipDecoder, Violation};
pub use link::{Link, MemoryLink, SerialLink};
pub use packet::{CoreIndex, Operation, Packet, PacketHeader};
pub use registry::{Registry, SlotId};
pub use resource::{rflags, Resource};
pub use session::{BroadcastHandle, BroadcastStatus, RecordingSink, SessionId, SessionSink};
pub use stats::LinkStats;
pub use timer::{TimerId, TimerKind, TimerTable};
pub use transmit::Transmitter;
