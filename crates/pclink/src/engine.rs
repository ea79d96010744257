// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The engine: one object threading link, decoder, router, registry and
//! timers together.
//!
//! The engine does not own a loop. Whoever runs the reactor calls
//! [`Engine::poll_link`] when the link is readable, [`Engine::poll_timers`]
//! when [`Engine::next_deadline`] passes, and [`Engine::handle_request`]
//! for user commands. Every call is synchronous and never blocks.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use pclink::{DaemonConfig, DriverFactory, Engine, MemoryLink, RecordingSink};
//!
//! let link = MemoryLink::new();
//! let mut engine = Engine::new(
//!     &DaemonConfig::default(),
//!     Box::new(link.clone()),
//!     DriverFactory::new(),
//! );
//! let mut sink = RecordingSink::new();
//! engine.start(&mut sink, Instant::now()).unwrap();
//!
//! // the enumerator asked the board for its driver list
//! assert!(!link.take_tx().is_empty());
//! ```

use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

use crate::config::DaemonConfig;
use crate::dispatch::{validate_frame, RouteStatus};
use crate::driver::{
    arm_reply, install_driver, Driver, DriverContext, DriverFactory, ReplyGuard, Request,
    RequestOutcome, E_NOACK,
};
use crate::enumerator::{self, Enumerator};
use crate::error::{Error, LinkError, PacketError, RegistryError, TxError};
use crate::frame::{RxBuffer, SlipDecoder};
use crate::link::Link;
use crate::packet::{CoreIndex, HexDump, Packet};
use crate::registry::{Registry, SlotId};
use crate::session::{BroadcastHandle, SessionId, SessionSink};
use crate::stats::LinkStats;
use crate::timer::{Expiry, TimerTable};
use crate::transmit::Transmitter;

/// Transport and dispatch core.
pub struct Engine {
    registry: Registry,
    timers: TimerTable,
    tx: Transmitter,
    rx: RxBuffer,
    decoder: SlipDecoder,
    factory: DriverFactory,
    overloads: BTreeMap<usize, String>,
    ack_timeout: Duration,
}

impl Engine {
    /// Build an engine around an already-open link.
    ///
    /// `config` is assumed validated.
    #[must_use]
    pub fn new(config: &DaemonConfig, link: Box<dyn Link>, factory: DriverFactory) -> Self {
        Self {
            registry: Registry::new(config.max_slots, config.max_resources),
            timers: TimerTable::new(config.max_timers),
            tx: Transmitter::new(link, config.trace_packets),
            rx: RxBuffer::new(config.rx_buffer_size),
            decoder: SlipDecoder::new(),
            factory,
            overloads: config
                .overloads
                .iter()
                .map(|o| (o.slot, o.driver.clone()))
                .collect(),
            ack_timeout: config.ack_timeout(),
        }
    }

    /// Install the enumerator in slot 0 and ask the board for its driver
    /// list.
    pub fn start(&mut self, sink: &mut dyn SessionSink, now: Instant) -> Result<(), Error> {
        let slot = SlotId::ENUMERATOR;
        self.registry.install(slot, enumerator::DRIVER_NAME)?;
        let driver = Enumerator::new(std::mem::take(&mut self.overloads));
        self.registry.set_driver(slot, Box::new(driver))?;

        match self.with_driver(slot, sink, now, |d, ctx| d.on_init(ctx)) {
            Some(result) => result,
            None => Err(RegistryError::NoDriver(slot.get()).into()),
        }
    }

    /// Load `driver_name` into `slot` outside enumeration and run its
    /// `on_init`.
    pub fn install(
        &mut self,
        slot: SlotId,
        driver_name: &str,
        core: Option<CoreIndex>,
        sink: &mut dyn SessionSink,
        now: Instant,
    ) -> Result<(), Error> {
        install_driver(
            &mut self.registry,
            &mut self.timers,
            &self.factory,
            slot,
            driver_name,
            core,
        )?;
        self.init_slot(slot, sink, now);
        Ok(())
    }

    // ---- accessors -------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    #[inline]
    #[must_use]
    pub fn link_name(&self) -> &str {
        self.tx.link_name()
    }

    /// Counter snapshot, decoder counters included.
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        let mut stats = self.tx.stats().clone();
        let decoder = self.decoder.stats();
        stats.frames_decoded = decoder.frames;
        stats.protocol_violations = decoder.violations;
        stats
    }

    /// Earliest armed timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.timers.time_until_next(now)
    }

    // ---- receive path ----------------------------------------------------

    /// Drain the link until it would block, dispatching every complete
    /// frame in arrival order. Returns the number of bytes read.
    ///
    /// End-of-file and read errors other than would-block are fatal.
    pub fn poll_link(&mut self, sink: &mut dyn SessionSink, now: Instant) -> Result<usize, LinkError> {
        let mut total = 0;
        loop {
            let link = self.tx.link_mut();
            match self.rx.read_with(|buf| link.read(buf)) {
                Ok(0) => {
                    tracing::error!("link to board at {} closed", self.tx.link_name());
                    return Err(LinkError::Closed);
                }
                Ok(n) => {
                    total += n;
                    self.tx.stats_mut().bytes_read += n as u64;
                    self.drain_rx(sink, now);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!(error = %e, "read from board at {} failed", self.tx.link_name());
                    return Err(LinkError::Io(e));
                }
            }
        }
    }

    /// Decode `bytes` as if read from the link and dispatch the frames.
    pub fn feed(&mut self, bytes: &[u8], sink: &mut dyn SessionSink, now: Instant) -> Vec<RouteStatus> {
        self.tx.stats_mut().bytes_read += bytes.len() as u64;
        let frames = self.decoder.decode_to_vec(bytes);
        frames
            .iter()
            .map(|frame| self.dispatch_frame(frame, sink, now))
            .collect()
    }

    fn drain_rx(&mut self, sink: &mut dyn SessionSink, now: Instant) {
        let mut frames = Vec::new();
        self.decoder
            .decode_buffer(&mut self.rx, |frame| frames.push(frame.to_vec()));
        for frame in &frames {
            self.dispatch_frame(frame, sink, now);
        }
    }

    /// Validate one decoded frame and hand it to the driver bound to its
    /// core.
    pub fn dispatch_frame(
        &mut self,
        frame: &[u8],
        sink: &mut dyn SessionSink,
        now: Instant,
    ) -> RouteStatus {
        let trace = self.tx.trace_packets();
        let accepted = match validate_frame(frame) {
            Ok(accepted) => accepted,
            Err(e) => return self.reject(frame, e),
        };
        if trace {
            tracing::trace!("<<{}", HexDump(frame));
        }
        let packet = match Packet::from_bytes(accepted.logical) {
            Ok(packet) => packet,
            Err(e) => return self.reject(frame, e),
        };
        let core = accepted.core;
        self.tx.stats_mut().packets_accepted += 1;

        let Some(slot) = self.registry.route(core) else {
            tracing::info!(core = core.get(), "no driver for core, packet dropped");
            self.tx.stats_mut().routing_misses += 1;
            return RouteStatus::Unrouted(core);
        };
        self.with_driver(slot, sink, now, |d, ctx| d.on_packet(ctx, &packet));
        self.tx.stats_mut().packets_routed += 1;
        RouteStatus::Delivered(slot)
    }

    fn reject(&mut self, frame: &[u8], err: PacketError) -> RouteStatus {
        tracing::warn!(error = %err, "invalid packet from board at {}", self.tx.link_name());
        if self.tx.trace_packets() {
            tracing::trace!("<X{}", HexDump(frame));
        }
        self.tx.stats_mut().record_rejection(&err);
        RouteStatus::Rejected(err)
    }

    // ---- transmit --------------------------------------------------------

    /// Send a packet outside any driver callback.
    pub fn send(&mut self, core: CoreIndex, packet: &Packet) -> Result<(), TxError> {
        self.tx.send(core, packet)
    }

    // ---- timers ----------------------------------------------------------

    /// Fire every timer due at `now`. Returns how many fired.
    ///
    /// A timer guarding a resource reply releases the lock and tells the
    /// waiting session before the owning driver sees the expiry. A timer
    /// canceled by an earlier callback of the same batch does not fire.
    pub fn poll_timers(&mut self, sink: &mut dyn SessionSink, now: Instant) -> usize {
        let mut fired = 0;
        for id in self.timers.due(now) {
            let Some(expiry) = self.timers.fire(id, now) else {
                continue;
            };
            fired += 1;
            self.release_guarded(&expiry, sink);
            let token = expiry.token;
            self.with_driver(expiry.owner, sink, now, |d, ctx| d.on_timer(ctx, token));
        }
        fired
    }

    fn release_guarded(&mut self, expiry: &Expiry, sink: &mut dyn SessionSink) {
        let Ok(slot) = self.registry.slot_mut(expiry.owner) else {
            return;
        };
        let slot_id = slot.id();
        let mut missing = 0;
        for res in slot.resources_mut() {
            if res.pending_timer() != Some(expiry.id) {
                continue;
            }
            res.take_pending_timer();
            missing += 1;
            let Some(session) = res.unlock() else {
                continue;
            };
            tracing::warn!(
                slot = slot_id.get(),
                resource = res.name(),
                session = %session,
                "missing ACK from the FPGA card"
            );
            sink.send(session, E_NOACK);
            sink.prompt(session);
        }
        self.tx.stats_mut().missing_acks += missing;
    }

    // ---- user requests ---------------------------------------------------

    /// Run a user `get`/`set` against `resource` of `slot`.
    ///
    /// An immediate reply is delivered to `session` (followed by a prompt)
    /// and also returned. A pending reply leaves the resource locked for
    /// `session` under an ack timer. On error nothing is sent and the
    /// resource is left unlocked.
    pub fn handle_request(
        &mut self,
        slot: SlotId,
        resource: &str,
        session: SessionId,
        request: Request,
        sink: &mut dyn SessionSink,
        now: Instant,
    ) -> Result<RequestOutcome, Error> {
        let entry = self
            .registry
            .slot(slot)
            .ok_or(RegistryError::UnknownSlot(slot.get()))?;
        let index = entry
            .resource_index(resource)
            .ok_or_else(|| RegistryError::UnknownResource {
                slot: slot.get(),
                name: resource.to_string(),
            })?;
        let res = &entry.resources()[index];
        match request {
            Request::Get if !res.is_readable() => {
                return Err(RegistryError::NotReadable(resource.to_string()).into())
            }
            Request::Set(_) if !res.is_writable() => {
                return Err(RegistryError::NotWritable(resource.to_string()).into())
            }
            _ => {}
        }
        if let Some(holder) = res.locked_by() {
            return Err(RegistryError::ResourceBusy {
                name: resource.to_string(),
                session: holder,
            }
            .into());
        }

        let outcome = self
            .with_driver(slot, sink, now, |d, ctx| {
                d.on_request(ctx, index, session, request)
            })
            .ok_or(RegistryError::NoDriver(slot.get()))?;

        match outcome {
            Ok(RequestOutcome::Reply(text)) => {
                sink.send(session, &text);
                sink.prompt(session);
                Ok(RequestOutcome::Reply(text))
            }
            Ok(RequestOutcome::Pending) => {
                if self.locked_by(slot, index) != Some(session) {
                    arm_reply(
                        &mut self.registry,
                        &mut self.timers,
                        ReplyGuard {
                            slot,
                            resource: index,
                            session,
                            timeout: self.ack_timeout,
                            token: index as u64,
                        },
                        now,
                    )?;
                }
                Ok(RequestOutcome::Pending)
            }
            Err(e) => {
                self.abandon_reply(slot, index, session);
                Err(e)
            }
        }
    }

    fn locked_by(&self, slot: SlotId, index: usize) -> Option<SessionId> {
        self.registry
            .slot(slot)
            .and_then(|s| s.resource(index))
            .and_then(|r| r.locked_by())
    }

    fn abandon_reply(&mut self, slot: SlotId, index: usize, session: SessionId) {
        let Some(res) = self
            .registry
            .slot_mut(slot)
            .ok()
            .and_then(|s| s.resource_mut(index))
        else {
            return;
        };
        if res.locked_by() != Some(session) {
            return;
        }
        res.unlock();
        if let Some(id) = res.take_pending_timer() {
            self.timers.cancel(id);
        }
    }

    /// Attach a broadcast subscription to `resource` of `slot`.
    pub fn subscribe(
        &mut self,
        slot: SlotId,
        resource: &str,
        handle: BroadcastHandle,
    ) -> Result<(), RegistryError> {
        let entry = self.registry.slot_mut(slot)?;
        let index = entry
            .resource_index(resource)
            .ok_or_else(|| RegistryError::UnknownResource {
                slot: slot.get(),
                name: resource.to_string(),
            })?;
        match entry.resource_mut(index) {
            Some(res) => res.subscribe(handle),
            None => Ok(()),
        }
    }

    /// Drop the broadcast subscription of `resource`, returning the old
    /// handle.
    pub fn unsubscribe(
        &mut self,
        slot: SlotId,
        resource: &str,
    ) -> Result<Option<BroadcastHandle>, RegistryError> {
        let entry = self.registry.slot_mut(slot)?;
        let index = entry
            .resource_index(resource)
            .ok_or_else(|| RegistryError::UnknownResource {
                slot: slot.get(),
                name: resource.to_string(),
            })?;
        Ok(entry.resource_mut(index).and_then(|r| r.unsubscribe()))
    }

    // ---- callbacks -------------------------------------------------------

    /// Run `f` against the driver of `slot`, then initialize any slot the
    /// driver installed meanwhile. `None` when the slot has no driver.
    fn with_driver<R, F>(
        &mut self,
        slot: SlotId,
        sink: &mut dyn SessionSink,
        now: Instant,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(&mut dyn Driver, &mut DriverContext<'_>) -> R,
    {
        let (mut driver, generation) = self.registry.take_driver(slot)?;
        let mut spawned = Vec::new();
        let result = {
            let mut ctx = DriverContext {
                slot,
                registry: &mut self.registry,
                timers: &mut self.timers,
                tx: &mut self.tx,
                sink: &mut *sink,
                factory: &self.factory,
                now,
                ack_timeout: self.ack_timeout,
                spawned: &mut spawned,
            };
            f(driver.as_mut(), &mut ctx)
        };
        self.registry.restore_driver(slot, driver, generation);

        for id in spawned {
            self.init_slot(id, sink, now);
        }
        Some(result)
    }

    fn init_slot(&mut self, slot: SlotId, sink: &mut dyn SessionSink, now: Instant) {
        match self.with_driver(slot, sink, now, |d, ctx| d.on_init(ctx)) {
            Some(Ok(())) => tracing::debug!(slot = slot.get(), "driver initialized"),
            Some(Err(e)) => {
                tracing::warn!(slot = slot.get(), error = %e, "driver initialization failed");
            }
            None => {}
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("link", &self.tx.link_name())
            .field("registry", &self.registry)
            .field("timers", &self.timers.len())
            .field("factory", &self.factory)
            .finish()
    }
}
