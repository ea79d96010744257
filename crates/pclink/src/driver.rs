// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boundary with peripheral drivers.
//!
//! A driver is a [`Driver`] trait object owned by its slot. The engine calls
//! it for every accepted packet from its core, for user requests against
//! its resources, and for its timers. Each call gets a [`DriverContext`]
//! giving access to the rest of the system: the transmit path, the timer
//! table, the registry and the session sink.
//!
//! # Asynchronous replies
//!
//! A `get` or `set` that needs the board's answer follows one convention:
//!
//! 1. send the request packet
//! 2. [`DriverContext::await_reply`]: lock the resource for the session and
//!    arm a one-shot ack timer, then return [`RequestOutcome::Pending`]
//! 3. when the reply packet arrives, [`DriverContext::complete_reply`]:
//!    deliver the text, release the lock, cancel the timer
//!
//! If the timer fires first the engine releases the lock itself and tells
//! the session the board never answered, so a lock can never leak.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{Error, RegistryError, TimerError, TxError};
use crate::packet::{CoreIndex, Packet};
use crate::registry::{Registry, Slot, SlotId};
use crate::resource::Resource;
use crate::session::{BroadcastStatus, SessionId, SessionSink};
use crate::timer::{TimerId, TimerKind, TimerTable};
use crate::transmit::Transmitter;

/// Sent to the session when a request packet could not be written.
pub const E_WRFPGA: &str = "ERROR 100 : Error writing to the FPGA card. Is link overloaded?\n";

/// Sent to the session when the board never answered.
pub const E_NOACK: &str = "ERROR 101 : Missing ACK from the FPGA card. Is link overloaded?\n";

/// A user request against a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get,
    Set(String),
}

/// How a driver answered a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Answer now with this text.
    Reply(String),
    /// The answer comes later; the resource lock is held.
    Pending,
}

/// A peripheral driver.
pub trait Driver: Send {
    /// Called once after the slot is set up: register resources, bind the
    /// core, send initial configuration.
    fn on_init(&mut self, ctx: &mut DriverContext<'_>) -> Result<(), Error> {
        let _ = ctx;
        Ok(())
    }

    /// Called for every accepted packet from the bound core.
    fn on_packet(&mut self, ctx: &mut DriverContext<'_>, packet: &Packet);

    /// Called for a user `get`/`set` on resource `resource`.
    ///
    /// Readability/writability has been checked, and the resource is not
    /// locked by another request.
    fn on_request(
        &mut self,
        ctx: &mut DriverContext<'_>,
        resource: usize,
        session: SessionId,
        request: Request,
    ) -> Result<RequestOutcome, Error> {
        let _ = (session, request);
        let name = ctx
            .resource(resource)
            .map(|r| r.name().to_string())
            .unwrap_or_default();
        Err(RegistryError::NotReadable(name).into())
    }

    /// Called when a timer armed by this driver fires.
    ///
    /// If the timer was guarding a resource reply, the lock has already
    /// been released and the session told.
    fn on_timer(&mut self, ctx: &mut DriverContext<'_>, token: u64) {
        let _ = (ctx, token);
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a driver may touch during a callback.
pub struct DriverContext<'a> {
    pub(crate) slot: SlotId,
    pub(crate) registry: &'a mut Registry,
    pub(crate) timers: &'a mut TimerTable,
    pub(crate) tx: &'a mut Transmitter,
    pub(crate) sink: &'a mut dyn SessionSink,
    pub(crate) factory: &'a DriverFactory,
    pub(crate) now: Instant,
    pub(crate) ack_timeout: Duration,
    pub(crate) spawned: &'a mut Vec<SlotId>,
}

impl<'a> DriverContext<'a> {
    /// The slot this driver lives in.
    #[inline]
    #[must_use]
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }

    /// Current time as seen by the engine.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Configured missing-ack timeout.
    #[inline]
    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// This driver's slot.
    pub fn slot(&mut self) -> Result<&mut Slot, RegistryError> {
        self.registry.slot_mut(self.slot)
    }

    /// Core bound to this slot.
    #[must_use]
    pub fn core(&self) -> Option<CoreIndex> {
        self.registry.slot(self.slot).and_then(Slot::core)
    }

    #[must_use]
    pub fn resource(&self, index: usize) -> Option<&Resource> {
        self.registry.slot(self.slot).and_then(|s| s.resource(index))
    }

    fn resource_mut(&mut self, index: usize) -> Result<&mut Resource, RegistryError> {
        let slot = self.slot;
        self.registry
            .slot_mut(slot)?
            .resource_mut(index)
            .ok_or_else(|| RegistryError::UnknownResource {
                slot: slot.get(),
                name: format!("#{}", index),
            })
    }

    /// Register a resource on this slot; returns its index.
    pub fn add_resource(&mut self, resource: Resource) -> Result<usize, RegistryError> {
        self.slot()?.add_resource(resource)
    }

    /// Set the slot's name and description.
    pub fn set_identity(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.slot()?.set_identity(name, description);
        Ok(())
    }

    /// Bind `core` to this slot.
    pub fn bind_core(&mut self, core: CoreIndex) -> Result<(), RegistryError> {
        self.registry.bind_core(core, self.slot)
    }

    /// Read-only view of the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &*self.registry
    }

    /// Mutable registry access, for drivers that manage other slots.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut *self.registry
    }

    // ---- transmit --------------------------------------------------------

    /// Send `packet` to this slot's core.
    pub fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        let core = self.core().ok_or(RegistryError::NoCore(self.slot.get()))?;
        self.tx.send(core, packet).map_err(Error::from)
    }

    /// Send `packet` to an explicit core.
    pub fn send_to(&mut self, core: CoreIndex, packet: &Packet) -> Result<(), TxError> {
        self.tx.send(core, packet)
    }

    // ---- timers ----------------------------------------------------------

    /// Arm a timer owned by this slot.
    pub fn add_timer(
        &mut self,
        kind: TimerKind,
        period: Duration,
        token: u64,
    ) -> Result<TimerId, TimerError> {
        self.timers.add(kind, period, self.slot, token, self.now)
    }

    /// Cancel a timer; stale ids are ignored.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    // ---- sessions --------------------------------------------------------

    pub fn send_to_session(&mut self, session: SessionId, text: &str) {
        self.sink.send(session, text);
    }

    pub fn prompt(&mut self, session: SessionId) {
        self.sink.prompt(session);
    }

    /// Lock `resource` for `session` and arm the ack timer.
    ///
    /// On timer failure the lock is released again.
    pub fn await_reply(
        &mut self,
        resource: usize,
        session: SessionId,
        token: u64,
    ) -> Result<(), Error> {
        arm_reply(
            self.registry,
            self.timers,
            ReplyGuard {
                slot: self.slot,
                resource,
                session,
                timeout: self.ack_timeout,
                token,
            },
            self.now,
        )
    }

    /// Deliver `text` to the session waiting on `resource`, release the
    /// lock and cancel the ack timer.
    ///
    /// Returns the session, or `None` if nobody was waiting (a late reply
    /// after a timeout).
    pub fn complete_reply(&mut self, resource: usize, text: &str) -> Option<SessionId> {
        let res = self.resource_mut(resource).ok()?;
        let timer = res.take_pending_timer();
        let session = res.unlock();
        if let Some(id) = timer {
            self.timers.cancel(id);
        }
        let session = session?;
        self.sink.send(session, text);
        self.sink.prompt(session);
        Some(session)
    }

    /// Push `payload` to the subscribers of `resource`.
    ///
    /// Returns `None` when nobody subscribes. A `Cleared` answer from the
    /// session layer drops the handle.
    pub fn broadcast(&mut self, resource: usize, payload: &str) -> Option<BroadcastStatus> {
        let handle = self.resource(resource)?.broadcast_handle()?;
        let status = self.sink.broadcast(handle, payload);
        if status == BroadcastStatus::Cleared {
            if let Ok(res) = self.resource_mut(resource) {
                res.unsubscribe();
            }
        }
        Some(status)
    }

    // ---- slot management -------------------------------------------------

    /// Put a new instance of `driver_name` in slot `id`, bound to `core`.
    ///
    /// Timers armed by a previous occupant of `id` are canceled. An unknown
    /// driver name leaves the slot allocated without a driver.
    /// The new driver's `on_init` runs after the current callback returns.
    pub fn install_driver(
        &mut self,
        id: SlotId,
        driver_name: &str,
        core: Option<CoreIndex>,
    ) -> Result<(), RegistryError> {
        install_driver(self.registry, self.timers, self.factory, id, driver_name, core)?;
        self.spawned.push(id);
        Ok(())
    }
}

/// A resource lock guarded by a one-shot ack timer.
pub(crate) struct ReplyGuard {
    pub(crate) slot: SlotId,
    pub(crate) resource: usize,
    pub(crate) session: SessionId,
    pub(crate) timeout: Duration,
    pub(crate) token: u64,
}

/// Lock the resource and arm its ack timer; the lock is dropped again if
/// the timer table is full.
pub(crate) fn arm_reply(
    registry: &mut Registry,
    timers: &mut TimerTable,
    guard: ReplyGuard,
    now: Instant,
) -> Result<(), Error> {
    let unknown = || RegistryError::UnknownResource {
        slot: guard.slot.get(),
        name: format!("#{}", guard.resource),
    };
    registry
        .slot_mut(guard.slot)?
        .resource_mut(guard.resource)
        .ok_or_else(unknown)?
        .try_lock(guard.session)?;

    let armed = timers.add(TimerKind::OneShot, guard.timeout, guard.slot, guard.token, now);
    let res = registry
        .slot_mut(guard.slot)?
        .resource_mut(guard.resource)
        .ok_or_else(unknown)?;
    match armed {
        Ok(id) => {
            res.set_pending_timer(Some(id));
            Ok(())
        }
        Err(e) => {
            res.unlock();
            Err(e.into())
        }
    }
}

/// Shared by the engine (static configuration) and drivers (enumeration).
pub(crate) fn install_driver(
    registry: &mut Registry,
    timers: &mut TimerTable,
    factory: &DriverFactory,
    id: SlotId,
    driver_name: &str,
    core: Option<CoreIndex>,
) -> Result<(), RegistryError> {
    if registry.slot(id).is_some() {
        let canceled = timers.cancel_owner(id);
        if canceled > 0 {
            tracing::debug!(slot = id.get(), canceled, "timers of previous driver canceled");
        }
    }
    if let Some(core) = core {
        if let Some(owner) = registry.core(core).slot() {
            if owner != id {
                registry.release_core(core, owner);
            }
        }
    }
    registry.install(id, driver_name)?;
    if let Some(core) = core {
        registry.bind_core(core, id)?;
    }
    match factory.create(driver_name) {
        Some(driver) => {
            registry.set_driver(id, driver)?;
            tracing::info!(slot = id.get(), driver = driver_name, "driver loaded");
        }
        None => {
            tracing::warn!(slot = id.get(), driver = driver_name, "unable to find driver");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

type Constructor = Box<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Name -> constructor table used in place of loading driver modules.
#[derive(Default)]
pub struct DriverFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for DriverFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverFactory")
            .field("drivers", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DriverFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(ctor));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build a fresh driver instance.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Box<dyn Driver>> {
        self.constructors.get(name).map(|ctor| ctor())
    }
}
