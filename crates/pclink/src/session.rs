// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boundary with the user-interface session layer.
//!
//! The session layer itself (TCP listener, command parser) lives outside this
//! crate. Drivers and the engine only need three things from it: reply to one
//! session, push a payload to the subscribers of a broadcast handle, and
//! prompt a session for its next command.

use std::collections::HashSet;
use std::fmt;

/// Identifier of a connected UI session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque broadcast-subscription handle. Zero is never a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BroadcastHandle(pub u32);

/// Outcome of a broadcast delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    /// At least one subscriber received the payload.
    Delivered,
    /// No subscribers remain; the handle should be cleared.
    Cleared,
}

/// What the core needs from the session layer.
pub trait SessionSink {
    /// Send `text` to one session.
    fn send(&mut self, session: SessionId, text: &str);

    /// Push `payload` to every session subscribed through `handle`.
    fn broadcast(&mut self, handle: BroadcastHandle, payload: &str) -> BroadcastStatus;

    /// Ask `session` for its next command.
    fn prompt(&mut self, session: SessionId);
}

/// Event recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Send(SessionId, String),
    Broadcast(BroadcastHandle, String),
    Prompt(SessionId),
}

/// In-memory [`SessionSink`] that records every call.
///
/// A handle is "subscribed" until [`RecordingSink::drop_subscribers`] is
/// called for it; after that broadcasts on it report
/// [`BroadcastStatus::Cleared`].
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
    unsubscribed: HashSet<u32>,
    log_events: bool,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that also logs every event at info level.
    #[must_use]
    pub fn logging() -> Self {
        Self {
            log_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Take all recorded events, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Texts sent to `session`, in order.
    #[must_use]
    pub fn sent_to(&self, session: SessionId) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Send(s, text) if *s == session => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Make every later broadcast on `handle` report `Cleared`.
    pub fn drop_subscribers(&mut self, handle: BroadcastHandle) {
        self.unsubscribed.insert(handle.0);
    }
}

impl SessionSink for RecordingSink {
    fn send(&mut self, session: SessionId, text: &str) {
        if self.log_events {
            tracing::info!(session = %session, "reply: {}", text.trim_end());
        }
        self.events.push(SinkEvent::Send(session, text.to_string()));
    }

    fn broadcast(&mut self, handle: BroadcastHandle, payload: &str) -> BroadcastStatus {
        if self.unsubscribed.contains(&handle.0) {
            return BroadcastStatus::Cleared;
        }
        if self.log_events {
            tracing::info!(handle = handle.0, "broadcast: {}", payload.trim_end());
        }
        self.events
            .push(SinkEvent::Broadcast(handle, payload.to_string()));
        BroadcastStatus::Delivered
    }

    fn prompt(&mut self, session: SessionId) {
        self.events.push(SinkEvent::Prompt(session));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::new();
        sink.send(SessionId(1), "42\n");
        sink.prompt(SessionId(1));
        sink.send(SessionId(2), "7\n");

        assert_eq!(sink.sent_to(SessionId(1)), vec!["42\n"]);
        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events()[1], SinkEvent::Prompt(SessionId(1)));
        assert_eq!(sink.drain().len(), 3);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_broadcast_cleared_after_unsubscribe() {
        let mut sink = RecordingSink::new();
        let h = BroadcastHandle(5);
        assert_eq!(sink.broadcast(h, "x\n"), BroadcastStatus::Delivered);
        sink.drop_subscribers(h);
        assert_eq!(sink.broadcast(h, "y\n"), BroadcastStatus::Cleared);
        assert_eq!(sink.events().len(), 1);
    }
}
