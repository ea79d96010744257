// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! One enum per concern; [`Error`] wraps them all for callers that do not
//! care which layer failed.

use std::io;

use thiserror::Error;

use crate::session::SessionId;

/// Frame encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("logical packet of {len} bytes exceeds the {max}-byte frame capacity")]
    TooLarge { len: usize, max: usize },
}

/// Packet validation and parsing errors.
///
/// The first five variants are the router's rejection reasons, checked in
/// this order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("frame of {0} bytes is shorter than header + CRC")]
    TooShort(usize),

    #[error("CRC check failed")]
    CrcMismatch,

    #[error("command byte {0:#04x} carries no read or write operation")]
    NoOperation(u8),

    #[error("core index {0} is outside the FPGA image")]
    CoreOutOfRange(usize),

    #[error("read response count mismatch: requested {requested}, returned {returned}, remaining {remaining}")]
    ReadCountMismatch {
        requested: usize,
        returned: isize,
        remaining: usize,
    },

    #[error("packet of {0} bytes exceeds the maximum packet length")]
    TooLong(usize),

    #[error("payload of {0} bytes does not fit the count byte")]
    CountOverflow(usize),
}

/// Transmit path errors.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("packet of {0} bytes is shorter than a header")]
    TooShort(usize),

    #[error("link to the board is not open")]
    NotConnected,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("link would block")]
    WouldBlock,

    #[error("short write: sent {sent} of {expected} bytes")]
    Partial { sent: usize, expected: usize },

    #[error("write to board failed: {0}")]
    Io(io::Error),
}

impl TxError {
    /// Backpressure from a full peer buffer rather than a real failure.
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

/// Fatal receive-side link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link closed by peer")]
    Closed,

    #[error("read from board failed: {0}")]
    Io(#[from] io::Error),
}

/// Device registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no free driver slot (pool of {0})")]
    SlotPoolExhausted(usize),

    #[error("slot {0} is not in use")]
    UnknownSlot(usize),

    #[error("slot {slot} has no resource {name:?}")]
    UnknownResource { slot: usize, name: String },

    #[error("slot {0} has no room for another resource")]
    ResourceTableFull(usize),

    #[error("resource {name:?} is busy with a request from session {session}")]
    ResourceBusy { name: String, session: SessionId },

    #[error("resource {0:?} is not readable")]
    NotReadable(String),

    #[error("resource {0:?} is not writable")]
    NotWritable(String),

    #[error("resource {0:?} does not broadcast")]
    NotBroadcastable(String),

    #[error("core {0} is already bound to a driver")]
    CoreAlreadyBound(usize),

    #[error("slot {0} has no core")]
    NoCore(usize),

    #[error("slot {0} has no driver loaded")]
    NoDriver(usize),

    #[error("invalid value {value:?} for resource {name:?}")]
    BadValue { name: String, value: String },
}

/// Timer facility errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer table full ({0} entries)")]
    TableFull(usize),

    #[error("periodic timer needs a non-zero period")]
    ZeroPeriod,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;
