// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device registry: physical cores and logical driver instances.
//!
//! Two tables:
//!
//! - 16 fixed [`Core`] entries, one per peripheral in the FPGA image, each
//!   holding the driver id read from the board and the slot bound to it.
//! - a fixed pool of [`Slot`]s (driver instances). A slot owns its driver,
//!   its resources and a back-reference to its core. Slots are reused by
//!   overwrite, never freed.
//!
//! A core counts as "having a callback" when it is bound to a slot whose
//! driver is present.

use std::fmt;

use crate::driver::Driver;
use crate::error::RegistryError;
use crate::packet::{CoreIndex, NUM_CORE};
use crate::resource::Resource;

/// Index of a slot in the driver-instance pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u16);

impl SlotId {
    /// The enumerator's slot.
    pub const ENUMERATOR: SlotId = SlotId(0);

    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index as u16)
    }

    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// One physical peripheral in the FPGA image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    index: CoreIndex,
    driver_id: u16,
    slot: Option<SlotId>,
}

impl Core {
    #[inline]
    #[must_use]
    pub fn index(&self) -> CoreIndex {
        self.index
    }

    /// Driver id read from the board's enumeration table (0 = none).
    #[inline]
    #[must_use]
    pub fn driver_id(&self) -> u16 {
        self.driver_id
    }

    /// Slot bound to this core.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// A driver instance.
pub struct Slot {
    id: SlotId,
    name: String,
    description: String,
    driver_name: String,
    core: Option<CoreIndex>,
    resources: Vec<Resource>,
    max_resources: usize,
    driver: Option<Box<dyn Driver>>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver_name", &self.driver_name)
            .field("core", &self.core)
            .field("resources", &self.resources)
            .field("has_driver", &self.driver.is_some())
            .finish()
    }
}

impl Slot {
    fn new(id: SlotId, driver_name: &str, max_resources: usize) -> Self {
        Self {
            id,
            name: driver_name.to_string(),
            description: String::new(),
            driver_name: driver_name.to_string(),
            core: None,
            resources: Vec::new(),
            max_resources,
            driver: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Human-readable name (defaults to the driver name).
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Name the driver was requested under.
    #[inline]
    #[must_use]
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn set_identity(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.name = name.into();
        self.description = description.into();
    }

    #[inline]
    #[must_use]
    pub fn core(&self) -> Option<CoreIndex> {
        self.core
    }

    #[inline]
    #[must_use]
    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    #[must_use]
    pub fn resource(&self, index: usize) -> Option<&Resource> {
        self.resources.get(index)
    }

    pub fn resource_mut(&mut self, index: usize) -> Option<&mut Resource> {
        self.resources.get_mut(index)
    }

    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.iter_mut()
    }

    /// Index of the resource called `name`.
    #[must_use]
    pub fn resource_index(&self, name: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.name() == name)
    }

    /// Register a resource; returns its index.
    pub fn add_resource(&mut self, resource: Resource) -> Result<usize, RegistryError> {
        if self.resources.len() >= self.max_resources {
            return Err(RegistryError::ResourceTableFull(self.id.get()));
        }
        self.resources.push(resource);
        Ok(self.resources.len() - 1)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The core and slot tables.
#[derive(Debug)]
pub struct Registry {
    cores: Vec<Core>,
    slots: Vec<Option<Slot>>,
    /// Bumped on every install, per slot index.
    generations: Vec<u32>,
    max_resources: usize,
}

impl Registry {
    #[must_use]
    pub fn new(max_slots: usize, max_resources: usize) -> Self {
        Self {
            cores: CoreIndex::all()
                .map(|index| Core {
                    index,
                    driver_id: 0,
                    slot: None,
                })
                .collect(),
            slots: (0..max_slots).map(|_| None).collect(),
            generations: vec![0; max_slots],
            max_resources,
        }
    }

    // ---- cores -----------------------------------------------------------

    #[must_use]
    pub fn core(&self, index: CoreIndex) -> &Core {
        &self.cores[index.get()]
    }

    pub fn cores(&self) -> impl Iterator<Item = &Core> {
        self.cores.iter()
    }

    /// Driver ids of all cores, in core order.
    #[must_use]
    pub fn driver_ids(&self) -> [u16; NUM_CORE] {
        let mut ids = [0u16; NUM_CORE];
        for (id, core) in ids.iter_mut().zip(&self.cores) {
            *id = core.driver_id;
        }
        ids
    }

    pub fn set_driver_id(&mut self, index: CoreIndex, driver_id: u16) {
        self.cores[index.get()].driver_id = driver_id;
    }

    /// Bind `core` to `slot`.
    ///
    /// Binding the same pair again is a no-op; binding a core that already
    /// belongs to another slot fails.
    pub fn bind_core(&mut self, core: CoreIndex, slot: SlotId) -> Result<(), RegistryError> {
        match self.cores[core.get()].slot {
            Some(bound) if bound == slot => return Ok(()),
            Some(_) => return Err(RegistryError::CoreAlreadyBound(core.get())),
            None => {}
        }
        let entry = self.slot_mut(slot)?;
        entry.core = Some(core);
        self.cores[core.get()].slot = Some(slot);
        tracing::debug!(core = core.get(), slot = slot.get(), "core bound");
        Ok(())
    }

    /// Unbind `core` if `slot` holds it. Returns false otherwise.
    pub fn release_core(&mut self, core: CoreIndex, slot: SlotId) -> bool {
        if self.cores[core.get()].slot != Some(slot) {
            return false;
        }
        self.cores[core.get()].slot = None;
        if let Some(Some(entry)) = self.slots.get_mut(slot.get()) {
            entry.core = None;
        }
        true
    }

    /// Slot whose driver should receive packets from `core`.
    #[must_use]
    pub fn route(&self, core: CoreIndex) -> Option<SlotId> {
        let slot = self.cores[core.get()].slot?;
        self.slot(slot)
            .filter(|s| s.has_driver())
            .map(|_| slot)
    }

    // ---- slots -----------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn max_slots(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(id.get()).and_then(Option::as_ref)
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Result<&mut Slot, RegistryError> {
        self.slots
            .get_mut(id.get())
            .and_then(Option::as_mut)
            .ok_or(RegistryError::UnknownSlot(id.get()))
    }

    /// Occupied slots in index order.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// First occupied slot called `name`.
    #[must_use]
    pub fn find_slot(&self, name: &str) -> Option<SlotId> {
        self.slots().find(|s| s.name() == name).map(Slot::id)
    }

    /// Allocate the first free slot.
    pub fn allocate(&mut self, driver_name: &str) -> Result<SlotId, RegistryError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::SlotPoolExhausted(self.slots.len()))?;
        self.install(SlotId::new(index), driver_name)
    }

    /// Put a fresh instance in slot `id`, overwriting whatever was there.
    ///
    /// A core bound to the previous occupant is released.
    pub fn install(&mut self, id: SlotId, driver_name: &str) -> Result<SlotId, RegistryError> {
        let entry = self
            .slots
            .get_mut(id.get())
            .ok_or(RegistryError::UnknownSlot(id.get()))?;
        if let Some(old) = entry.take() {
            tracing::debug!(slot = id.get(), old = %old.driver_name, new = driver_name, "slot overwritten");
            if let Some(core) = old.core {
                self.cores[core.get()].slot = None;
            }
        }
        self.slots[id.get()] = Some(Slot::new(id, driver_name, self.max_resources));
        self.generations[id.get()] = self.generations[id.get()].wrapping_add(1);
        Ok(id)
    }

    // ---- drivers ---------------------------------------------------------

    pub fn set_driver(&mut self, id: SlotId, driver: Box<dyn Driver>) -> Result<(), RegistryError> {
        self.slot_mut(id)?.driver = Some(driver);
        Ok(())
    }

    /// Move the driver out of its slot for the duration of a callback,
    /// together with the slot's install generation.
    pub(crate) fn take_driver(&mut self, id: SlotId) -> Option<(Box<dyn Driver>, u32)> {
        let driver = self.slots.get_mut(id.get())?.as_mut()?.driver.take()?;
        Some((driver, self.generations[id.get()]))
    }

    /// Return a driver taken with [`take_driver`](Self::take_driver).
    ///
    /// If the slot was reinstalled during the callback `driver` is dropped,
    /// even when the new occupant has no driver of its own.
    pub(crate) fn restore_driver(&mut self, id: SlotId, driver: Box<dyn Driver>, generation: u32) {
        let current = self.generations.get(id.get()).copied();
        match self.slots.get_mut(id.get()).and_then(Option::as_mut) {
            Some(slot) if current == Some(generation) && slot.driver.is_none() => {
                slot.driver = Some(driver);
            }
            _ => tracing::debug!(slot = id.get(), "slot replaced during callback"),
        }
    }
}
