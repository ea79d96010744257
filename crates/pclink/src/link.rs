// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-serial link to the board.
//!
//! The core only needs non-blocking `read`/`write` with the usual
//! would-block convention. Serial line configuration (baud rate, raw mode)
//! is the job of whoever sets up the device.
//!
//! # Implementations
//!
//! - [`SerialLink`] - character device opened non-blocking
//! - [`MemoryLink`] - in-memory link for tests, with switchable impairments

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Non-blocking byte link.
pub trait Link: Send {
    /// Read available bytes.
    ///
    /// # Returns
    /// * `Ok(0)` - the peer closed the link
    /// * `Ok(n)` - `n` bytes were read
    /// * `Err(WouldBlock)` - nothing to read right now
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `buf` as the link accepts without blocking.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// True while the link can carry traffic.
    fn is_open(&self) -> bool;

    /// Name used in log messages.
    fn describe(&self) -> String {
        "link".to_string()
    }
}

// ============================================================================
// SerialLink
// ============================================================================

/// Serial character device opened with `O_NONBLOCK | O_NOCTTY`.
#[derive(Debug)]
pub struct SerialLink {
    file: Option<File>,
    path: PathBuf,
}

impl SerialLink {
    /// Open `path` read/write, non-blocking, without becoming its
    /// controlling terminal.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&path)?;
        tracing::info!(port = %path.display(), "serial link opened");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the device. Later writes fail with "not connected".
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::info!(port = %self.path.display(), "serial link closed");
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl AsRawFd for SerialLink {
    /// -1 once closed.
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }
}

// ============================================================================
// MemoryLink
// ============================================================================

#[derive(Debug)]
struct MemoryState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    open: bool,
    hung_up: bool,
    read_chunk: Option<usize>,
    write_capacity: Option<usize>,
    read_error: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
}

/// In-memory link for tests.
///
/// Clones share the same state, so a test keeps one handle to inject
/// received bytes and inspect written ones while the engine owns another.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                rx: VecDeque::new(),
                tx: Vec::new(),
                open: true,
                hung_up: false,
                read_chunk: None,
                write_capacity: None,
                read_error: None,
                write_error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for the next reads.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// Bytes still waiting to be read.
    #[must_use]
    pub fn rx_pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Take everything written so far.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().tx)
    }

    /// Limit each read to `chunk` bytes.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        self.lock().read_chunk = chunk;
    }

    /// Limit each write to `capacity` bytes; zero makes writes would-block.
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.lock().write_capacity = capacity;
    }

    /// Fail every read with `kind` (or stop failing with `None`).
    pub fn fail_reads(&self, kind: Option<io::ErrorKind>) {
        self.lock().read_error = kind;
    }

    /// Fail every write with `kind` (or stop failing with `None`).
    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        self.lock().write_error = kind;
    }

    /// Peer hang-up: reads return end-of-file once the queue drains.
    pub fn hang_up(&self) {
        self.lock().hung_up = true;
    }

    /// Mark the link closed; the transmit path refuses to send.
    pub fn close(&self) {
        self.lock().open = false;
    }
}

impl Link for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if let Some(kind) = state.read_error {
            return Err(io::Error::from(kind));
        }
        if state.rx.is_empty() {
            return if state.hung_up {
                Ok(0)
            } else {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            };
        }
        let limit = state.read_chunk.unwrap_or(usize::MAX).max(1);
        let n = buf.len().min(state.rx.len()).min(limit);
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if let Some(kind) = state.write_error {
            return Err(io::Error::from(kind));
        }
        let n = match state.write_capacity {
            Some(0) if !buf.is_empty() => {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            Some(cap) => buf.len().min(cap),
            None => buf.len(),
        };
        state.tx.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_link_roundtrip() {
        let link = MemoryLink::new();
        let mut engine_side = link.clone();

        link.push_rx(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(engine_side.read(&mut buf).expect("read"), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(link.rx_pending(), 2);

        assert_eq!(engine_side.write(b"abc").expect("write"), 3);
        assert_eq!(link.take_tx(), b"abc");
        assert!(link.take_tx().is_empty());
    }

    #[test]
    fn test_memory_link_empty_would_block() {
        let mut link = MemoryLink::new();
        let mut buf = [0u8; 8];
        let err = link.read(&mut buf).expect_err("empty");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_memory_link_hang_up() {
        let mut link = MemoryLink::new();
        link.push_rx(&[9]);
        link.hang_up();
        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf).expect("data first"), 1);
        assert_eq!(link.read(&mut buf).expect("eof"), 0);
    }

    #[test]
    fn test_memory_link_write_capacity() {
        let mut link = MemoryLink::new();
        link.set_write_capacity(Some(2));
        assert_eq!(link.write(b"hello").expect("short"), 2);

        link.set_write_capacity(Some(0));
        let err = link.write(b"hello").expect_err("full");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        link.fail_writes(Some(io::ErrorKind::BrokenPipe));
        let err = link.write(b"x").expect_err("broken");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_memory_link_read_chunk() {
        let mut link = MemoryLink::new();
        link.push_rx(&[0; 10]);
        link.set_read_chunk(Some(4));
        let mut buf = [0u8; 64];
        assert_eq!(link.read(&mut buf).expect("read"), 4);
    }

    #[test]
    fn test_serial_link_missing_device() {
        assert!(SerialLink::open("/nonexistent/ttyUSB9").is_err());
    }

    #[test]
    fn test_serial_link_on_regular_file() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let mut link = SerialLink::open(file.path()).expect("open");
        assert!(link.is_open());
        assert!(link.as_raw_fd() >= 0);
        assert_eq!(link.write(b"\xc0\xc0").expect("write"), 2);

        link.close();
        assert!(!link.is_open());
        assert_eq!(link.as_raw_fd(), -1);
        let err = link.write(b"x").expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
