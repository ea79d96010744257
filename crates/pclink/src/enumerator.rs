// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in driver that discovers what the FPGA image contains.
//!
//! Core 0 of every image answers a read of register 0x40 with 16 big-endian
//! driver ids, one per core (0 = empty core). The enumerator lives in slot
//! 0, asks for that table at start-up and loads one driver per non-empty
//! core into slots 1, 2, ... in core order. A static overload for a slot
//! replaces the driver the catalog names for it.
//!
//! Overloads that enumeration does not reach (or all of them, if the board
//! never answers) are loaded without a core.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::catalog;
use crate::driver::{Driver, DriverContext, Request, RequestOutcome};
use crate::error::{Error, RegistryError};
use crate::packet::{CoreIndex, Operation, Packet, NUM_CORE};
use crate::registry::SlotId;
use crate::resource::{rflags, Resource};
use crate::session::SessionId;
use crate::timer::{TimerId, TimerKind};

/// Name the enumerator registers under.
pub const DRIVER_NAME: &str = "enumerator";

/// Register holding the driver id table.
pub const ENUM_REG_DRIVLIST: u8 = 0x40;

/// Bytes in the driver id table.
pub const DRIVLIST_LEN: usize = 2 * NUM_CORE;

/// Resource listing the driver ids.
pub const FN_DRIVLIST: &str = "drivlist";

const RSC_DRIVLIST: usize = 0;
const ACK_TOKEN: u64 = 0;

/// The enumerator driver.
#[derive(Debug, Default)]
pub struct Enumerator {
    overloads: BTreeMap<usize, String>,
    ack_timer: Option<TimerId>,
    enumerated: bool,
}

impl Enumerator {
    /// `overloads` maps slot index to driver name.
    pub fn new<I>(overloads: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        Self {
            overloads: overloads.into_iter().collect(),
            ack_timer: None,
            enumerated: false,
        }
    }

    fn request_list(&mut self, ctx: &mut DriverContext<'_>) {
        let pkt = Packet::read(CoreIndex::ZERO, ENUM_REG_DRIVLIST, DRIVLIST_LEN as u8);
        if let Err(e) = ctx.send_to(CoreIndex::ZERO, &pkt) {
            tracing::warn!(error = %e, "driver list request not sent");
        }
        if self.ack_timer.is_none() {
            match ctx.add_timer(TimerKind::OneShot, ctx.ack_timeout(), ACK_TOKEN) {
                Ok(id) => self.ack_timer = Some(id),
                Err(e) => tracing::warn!(error = %e, "no timer for driver list request"),
            }
        }
    }

    fn cancel_ack(&mut self, ctx: &mut DriverContext<'_>) {
        if let Some(id) = self.ack_timer.take() {
            ctx.cancel_timer(id);
        }
    }

    fn enumerate(&mut self, ctx: &mut DriverContext<'_>, table: &[u8]) {
        self.enumerated = true;

        let ids: Vec<(CoreIndex, u16)> = CoreIndex::all()
            .zip(table.chunks_exact(2))
            .map(|(core, pair)| (core, u16::from_be_bytes([pair[0], pair[1]])))
            .collect();
        for &(core, id) in &ids {
            ctx.registry_mut().set_driver_id(core, id);
        }
        tracing::info!(
            cores = ids.iter().filter(|(_, id)| *id != 0).count(),
            "driver list received"
        );

        let max_slots = ctx.registry().max_slots();
        let mut next = 1;
        for (core, id) in ids {
            if id == 0 {
                continue;
            }
            if next >= max_slots {
                tracing::warn!(core = core.get(), "unable to allocate a slot for core");
                break;
            }
            let slot = next;
            next += 1;

            let name = match self.overloads.remove(&slot) {
                Some(name) => name,
                None => match catalog::by_id(id) {
                    Some(desc) => desc.name.to_string(),
                    None => {
                        tracing::warn!(
                            core = core.get(),
                            driver_id = id,
                            "unable to find driver name for driver id"
                        );
                        continue;
                    }
                },
            };
            if let Err(e) = ctx.install_driver(SlotId::new(slot), &name, Some(core)) {
                tracing::warn!(slot, core = core.get(), error = %e, "driver not installed");
            }
        }

        self.load_remaining_overloads(ctx);
    }

    fn load_remaining_overloads(&mut self, ctx: &mut DriverContext<'_>) {
        for (slot, name) in std::mem::take(&mut self.overloads) {
            if let Err(e) = ctx.install_driver(SlotId::new(slot), &name, None) {
                tracing::warn!(slot, driver = %name, error = %e, "overload not installed");
            }
        }
    }

    fn render_drivlist(ctx: &DriverContext<'_>) -> String {
        let mut out = String::with_capacity(5 * NUM_CORE);
        for id in ctx.registry().driver_ids() {
            let _ = write!(out, "{:04x} ", id);
        }
        out.pop();
        out.push('\n');
        out
    }
}

impl Driver for Enumerator {
    fn on_init(&mut self, ctx: &mut DriverContext<'_>) -> Result<(), Error> {
        ctx.set_identity(DRIVER_NAME, "The table of driver IDs for this FPGA image")?;
        ctx.add_resource(Resource::new(FN_DRIVLIST, rflags::READABLE))?;
        ctx.bind_core(CoreIndex::ZERO)?;
        self.request_list(ctx);
        Ok(())
    }

    fn on_packet(&mut self, ctx: &mut DriverContext<'_>, packet: &Packet) {
        if packet.header.operation() == Operation::Write {
            self.cancel_ack(ctx);
            return;
        }

        let hdr = &packet.header;
        if hdr.is_auto_data()
            || hdr.reg != ENUM_REG_DRIVLIST
            || usize::from(hdr.count) != DRIVLIST_LEN
        {
            return;
        }
        self.cancel_ack(ctx);

        let table = packet.read_data();
        if table.len() != DRIVLIST_LEN {
            tracing::warn!(returned = table.len(), "short driver list from board");
            return;
        }
        if self.enumerated {
            tracing::debug!("driver list already processed");
            return;
        }
        self.enumerate(ctx, table);
    }

    fn on_request(
        &mut self,
        ctx: &mut DriverContext<'_>,
        resource: usize,
        _session: SessionId,
        request: Request,
    ) -> Result<RequestOutcome, Error> {
        match (resource, request) {
            (RSC_DRIVLIST, Request::Get) => Ok(RequestOutcome::Reply(Self::render_drivlist(ctx))),
            _ => Err(RegistryError::NotWritable(FN_DRIVLIST.to_string()).into()),
        }
    }

    fn on_timer(&mut self, ctx: &mut DriverContext<'_>, token: u64) {
        if token != ACK_TOKEN {
            return;
        }
        self.ack_timer = None;
        tracing::warn!("missing ACK from the FPGA card for the driver list request");
        self.load_remaining_overloads(ctx);
    }
}
