// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity table of one-shot and periodic timers.
//!
//! Drivers arm one timer per outstanding request and cancel it when any
//! reply for that request arrives. Expiry without cancellation means the
//! board never acknowledged.
//!
//! The table never calls anyone. The reactor asks it for the next deadline,
//! sleeps until then, and calls [`TimerTable::expire`], which hands back the
//! expired entries as [`Expiry`] events for the engine to route to their
//! owners. Time is always passed in, so tests run without a clock.

use std::time::{Duration, Instant};

use crate::error::TimerError;
use crate::registry::SlotId;

/// Handle to an armed timer.
///
/// Generational: once the timer fires (one-shot) or is canceled, the id
/// goes stale and never matches a later timer reusing the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once and is removed.
    OneShot,
    /// Fires every period until canceled.
    Periodic,
}

#[derive(Debug, Clone)]
struct Timer {
    kind: TimerKind,
    deadline: Instant,
    period: Duration,
    owner: SlotId,
    token: u64,
}

#[derive(Debug, Default)]
struct Entry {
    generation: u32,
    timer: Option<Timer>,
}

/// An expired timer, to be delivered to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub id: TimerId,
    pub kind: TimerKind,
    /// Slot whose driver armed the timer.
    pub owner: SlotId,
    /// Driver-chosen value identifying what the timer was watching.
    pub token: u64,
}

/// The timer table.
#[derive(Debug)]
pub struct TimerTable {
    entries: Vec<Entry>,
    free: Vec<u32>,
    capacity: usize,
    armed: usize,
}

impl TimerTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            armed: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.armed
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.armed == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arm a timer firing `period` after `now`.
    pub fn add(
        &mut self,
        kind: TimerKind,
        period: Duration,
        owner: SlotId,
        token: u64,
        now: Instant,
    ) -> Result<TimerId, TimerError> {
        if kind == TimerKind::Periodic && period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None if self.entries.len() < self.capacity => {
                self.entries.push(Entry::default());
                (self.entries.len() - 1) as u32
            }
            None => {
                tracing::warn!(capacity = self.capacity, "timer table full");
                return Err(TimerError::TableFull(self.capacity));
            }
        };

        let entry = &mut self.entries[index as usize];
        entry.timer = Some(Timer {
            kind,
            deadline: now + period,
            period,
            owner,
            token,
        });
        self.armed += 1;

        Ok(TimerId {
            index,
            generation: entry.generation,
        })
    }

    /// Cancel a timer. Returns false when `id` is stale; that is harmless.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.get_mut(id.index as usize) {
            Some(entry) if entry.generation == id.generation && entry.timer.is_some() => {
                self.release(id.index);
                true
            }
            _ => false,
        }
    }

    /// True while `id` refers to an armed timer.
    #[must_use]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.entries
            .get(id.index as usize)
            .is_some_and(|e| e.generation == id.generation && e.timer.is_some())
    }

    /// Earliest deadline among armed timers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|e| e.timer.as_ref().map(|t| t.deadline))
            .min()
    }

    /// Time left until the next deadline, zero if already due.
    #[must_use]
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Cancel every timer owned by `owner`. Returns how many were armed.
    pub fn cancel_owner(&mut self, owner: SlotId) -> usize {
        let owned: Vec<u32> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match &e.timer {
                Some(t) if t.owner == owner => Some(i as u32),
                _ => None,
            })
            .collect();
        for &index in &owned {
            self.release(index);
        }
        owned.len()
    }

    /// Ids of every timer due at `now`, earliest deadline first.
    ///
    /// Nothing is released; pass each id to [`fire`](Self::fire).
    #[must_use]
    pub fn due(&self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, u32)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match &e.timer {
                Some(t) if t.deadline <= now => Some((t.deadline, i as u32)),
                _ => None,
            })
            .collect();
        due.sort_unstable();
        due.into_iter()
            .map(|(_, index)| TimerId {
                index,
                generation: self.entries[index as usize].generation,
            })
            .collect()
    }

    /// Fire one due timer.
    ///
    /// `None` if `id` went stale (canceled since [`due`](Self::due)) or is
    /// not due yet. One-shot timers are removed. Periodic timers are
    /// rescheduled one period after `now`, so a stalled loop does not cause
    /// a burst of catch-up expiries.
    pub fn fire(&mut self, id: TimerId, now: Instant) -> Option<Expiry> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let timer = entry.timer.as_mut().filter(|t| t.deadline <= now)?;
        let expiry = Expiry {
            id,
            kind: timer.kind,
            owner: timer.owner,
            token: timer.token,
        };
        match expiry.kind {
            TimerKind::Periodic => timer.deadline = now + timer.period,
            TimerKind::OneShot => self.release(id.index),
        }
        Some(expiry)
    }

    /// Fire every timer due at `now`, earliest deadline first.
    pub fn expire(&mut self, now: Instant) -> Vec<Expiry> {
        self.due(now)
            .into_iter()
            .filter_map(|id| self.fire(id, now))
            .collect()
    }

    fn release(&mut self, index: u32) {
        let entry = &mut self.entries[index as usize];
        entry.timer = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.armed -= 1;
        self.free.push(index);
    }
}
