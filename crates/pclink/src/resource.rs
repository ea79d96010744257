// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-addressable resources of a driver instance.
//!
//! A resource carries two pieces of session-layer state:
//!
//! - the async-response lock: which UI session gets the next device reply
//!   for this resource. At most one session holds it; it is a logical
//!   ownership token, not a mutex.
//! - the broadcast handle: set while some session subscribes to unsolicited
//!   updates from the resource.

use crate::error::RegistryError;
use crate::session::{BroadcastHandle, SessionId};
use crate::timer::TimerId;

/// Resource capability flags.
pub mod rflags {
    /// `get` is allowed.
    pub const READABLE: u8 = 0x01;
    /// `set` is allowed.
    pub const WRITABLE: u8 = 0x02;
    /// Sessions may subscribe to pushed updates.
    pub const BROADCAST: u8 = 0x04;
}

/// One named resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    flags: u8,
    lock: Option<SessionId>,
    broadcast: Option<BroadcastHandle>,
    pending_timer: Option<TimerId>,
}

impl Resource {
    #[must_use]
    pub fn new(name: impl Into<String>, flags: u8) -> Self {
        Self {
            name: name.into(),
            flags,
            lock: None,
            broadcast: None,
            pending_timer: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.flags & rflags::READABLE != 0
    }

    #[inline]
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags & rflags::WRITABLE != 0
    }

    #[inline]
    #[must_use]
    pub fn can_broadcast(&self) -> bool {
        self.flags & rflags::BROADCAST != 0
    }

    // ------------------------------------------------------------------
    // Async-response lock
    // ------------------------------------------------------------------

    /// Session currently waiting on this resource.
    #[inline]
    #[must_use]
    pub fn locked_by(&self) -> Option<SessionId> {
        self.lock
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Take the lock for `session`. Fails if anyone holds it, `session`
    /// included.
    pub fn try_lock(&mut self, session: SessionId) -> Result<(), RegistryError> {
        match self.lock {
            Some(holder) => Err(RegistryError::ResourceBusy {
                name: self.name.clone(),
                session: holder,
            }),
            None => {
                self.lock = Some(session);
                Ok(())
            }
        }
    }

    /// Release the lock, returning its holder. No-op when unlocked.
    pub fn unlock(&mut self) -> Option<SessionId> {
        self.lock.take()
    }

    /// Ack timer watching the outstanding request, if any.
    #[inline]
    #[must_use]
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub(crate) fn set_pending_timer(&mut self, id: Option<TimerId>) {
        self.pending_timer = id;
    }

    pub(crate) fn take_pending_timer(&mut self) -> Option<TimerId> {
        self.pending_timer.take()
    }

    // ------------------------------------------------------------------
    // Broadcast subscription
    // ------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn broadcast_handle(&self) -> Option<BroadcastHandle> {
        self.broadcast
    }

    /// Attach a subscription handle. Handle zero means "none".
    pub fn subscribe(&mut self, handle: BroadcastHandle) -> Result<(), RegistryError> {
        if !self.can_broadcast() {
            return Err(RegistryError::NotBroadcastable(self.name.clone()));
        }
        self.broadcast = if handle.0 == 0 { None } else { Some(handle) };
        Ok(())
    }

    /// Drop the subscription handle.
    pub fn unsubscribe(&mut self) -> Option<BroadcastHandle> {
        self.broadcast.take()
    }
}
