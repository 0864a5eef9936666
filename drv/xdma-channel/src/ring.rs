// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The scatter-gather descriptor ring.
//!
//! A ring is carved out of one caller-owned block of (uncached) memory, as
//! many whole descriptors as fit, and linked into a cycle through each
//! descriptor's next pointer. The engine follows those next pointers; we
//! don't. Software walks the ring by slot index, so wrap-around is just
//! `(i + 1) % len`.
//!
//! # Cursors
//!
//! - `put`: the slot the next put will fill.
//! - `get`: the oldest slot holding a descriptor not yet taken back.
//! - `last`: the slot most recently put, i.e. the tail as software sees it.
//! - `batch`: bookkeeping for puts that have not been committed yet.
//!
//! All three slot cursors start at the *last* slot of the ring, so that from
//! the very first put there is a real "previous tail" to talk about.
//!
//! # Stop bits and commit
//!
//! The engine walks descriptors until it processes one with `SG_DISABLE` set
//! in its control word, then stops. The ring maintains one rule: every put
//! slot starts out with `SG_DISABLE` set, because it is the tail, and that bit
//! is cleared only once something has been chained after it *and* the engine
//! is allowed to see that something.
//!
//! Puts are grouped into batches. The first put after a commit opens a batch
//! and remembers the tail at that moment as the batch's *anchor*. The
//! anchor's stop bit is what keeps the engine out of the batch:
//!
//! ```text
//!      anchor     first                  last
//!   ... [ S ] -> [ . ] -> [ . ] -> ... -> [ S ]
//!         ^ held until commit              ^ new tail
//! ```
//!
//! Inside the batch, each put clears the stop bit of the slot before it right
//! away, since the engine can't get there past the anchor. Commit then clears
//! the anchor's stop bit, and the whole batch becomes reachable at once.
//!
//! On a fresh ring the first put lands in the slot that is also the anchor
//! (there is no earlier slot), so that batch has nothing to release at commit
//! time; the engine is pointed straight at it by `sg_start`.

use core::sync::atomic::{fence, Ordering};

use crate::bd::BufferDescriptor;
use crate::error::DmaError;
use crate::regs::{Control, Status};

/// Handle naming one slot of a ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Uncommitted puts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Batch {
    /// Tail at the time the batch was opened; its stop bit fences the engine
    /// off from the batch.
    anchor: usize,
    /// First slot written in this batch.
    first: usize,
}

pub struct DescriptorRing<'a> {
    descriptors: &'a [BufferDescriptor],
    /// Address the engine uses for `descriptors[0]`.
    bus_base: u32,
    put: usize,
    get: usize,
    last: usize,
    batch: Option<Batch>,
    /// Slots holding descriptors that haven't been taken back by `take`.
    ///
    /// Invariant: always `<= descriptors.len()`.
    active: usize,
}

impl<'a> DescriptorRing<'a> {
    /// Builds a ring in `memory`, which the DMA engine addresses as
    /// `bus_base`.
    ///
    /// `memory` is split into as many whole descriptors as fit; leftover
    /// words are left alone. Every descriptor is zeroed and linked to the
    /// next one, the last back to the first.
    ///
    /// # Panics
    ///
    /// If `memory` can't hold a single descriptor, if `bus_base` isn't
    /// word-aligned, or if the ring would run off the end of the 32-bit bus
    /// address space.
    pub fn new(memory: &'a mut [u32], bus_base: u32) -> Self {
        let len = memory.len() / BufferDescriptor::WORDS;
        assert!(len > 0, "descriptor memory smaller than one descriptor");
        assert_eq!(bus_base & 0b11, 0, "bus address must be word-aligned");
        let span = u32::try_from(len * BufferDescriptor::SIZE)
            .ok()
            .and_then(|s| bus_base.checked_add(s - 1));
        assert!(span.is_some(), "ring does not fit in bus address space");

        // Safety: BufferDescriptor is repr(C) over [VolatileCell<u32>; 10],
        // and VolatileCell is repr(transparent) over u32, so it has the same
        // alignment as u32 and every bit pattern is valid. `len` whole
        // descriptors fit inside `memory`. We consumed the exclusive borrow,
        // so nothing else can reach this memory for 'a; from here on it is
        // shared only with the engine, through volatile accesses.
        let descriptors: &'a [BufferDescriptor] = unsafe {
            core::slice::from_raw_parts(
                memory.as_mut_ptr() as *const BufferDescriptor,
                len,
            )
        };

        let ring = Self {
            descriptors,
            bus_base,
            put: len - 1,
            get: len - 1,
            last: len - 1,
            batch: None,
            active: 0,
        };
        for (i, d) in descriptors.iter().enumerate() {
            d.initialize();
            d.set_next_ptr(ring.bus_addr_of(ring.advance(i)));
        }
        ring
    }

    /// Number of slots in the ring.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Number of slots holding descriptors that haven't been taken back.
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn is_full(&self) -> bool {
        self.active == self.len()
    }

    pub fn bus_base(&self) -> u32 {
        self.bus_base
    }

    /// All descriptors in slot order, as the engine sees them in memory.
    pub fn descriptors(&self) -> &'a [BufferDescriptor] {
        self.descriptors
    }

    /// # Panics
    ///
    /// If `slot` is past the end of this ring, which can only happen with a
    /// `Slot` that came from a different, larger ring.
    pub fn descriptor(&self, slot: Slot) -> &'a BufferDescriptor {
        &self.descriptors[slot.0]
    }

    /// Address the engine uses to reach `slot`.
    pub fn bus_addr(&self, slot: Slot) -> u32 {
        self.bus_addr_of(slot.0)
    }

    /// Finds the slot at bus address `addr`, if it is the start of one of
    /// this ring's descriptors.
    pub fn slot_of(&self, addr: u32) -> Option<Slot> {
        let off = usize::try_from(addr.checked_sub(self.bus_base)?).ok()?;
        if off % BufferDescriptor::SIZE != 0 {
            return None;
        }
        let i = off / BufferDescriptor::SIZE;
        (i < self.len()).then_some(Slot(i))
    }

    pub fn next(&self, slot: Slot) -> Slot {
        Slot(self.advance(slot.0))
    }

    pub fn put_slot(&self) -> Slot {
        Slot(self.put)
    }

    pub fn get_slot(&self) -> Slot {
        Slot(self.get)
    }

    pub fn last_slot(&self) -> Slot {
        Slot(self.last)
    }

    /// The anchor of the open batch, or `None` when every put has been
    /// committed.
    pub fn commit_anchor(&self) -> Option<Slot> {
        self.batch.map(|b| Slot(b.anchor))
    }

    /// Whether the engine would be walking into uncommitted descriptors if it
    /// started processing at `slot`.
    pub fn is_uncommitted(&self, slot: Slot) -> bool {
        self.batch
            .is_some_and(|b| slot.0 == b.anchor || slot.0 == b.first)
    }

    fn bus_addr_of(&self, i: usize) -> u32 {
        // Can't overflow; checked against the whole ring in `new`.
        self.bus_base + (i * BufferDescriptor::SIZE) as u32
    }

    fn advance(&self, i: usize) -> usize {
        let n = i + 1;
        if n == self.len() {
            0
        } else {
            n
        }
    }

    /// Copies `bd` into the slot at `put` and links it in as the new tail.
    ///
    /// `bd` itself is modified: its stop bit is set and its status is marked
    /// busy, the same as the copy in the ring.
    pub(crate) fn put(
        &mut self,
        bd: &BufferDescriptor,
    ) -> Result<Slot, DmaError> {
        if self.is_full() {
            return Err(DmaError::SgListFull);
        }
        let slot = &self.descriptors[self.put];
        if slot.is_locked() {
            return Err(DmaError::SgBdLocked);
        }

        // Every new descriptor is the tail until something is put after it.
        // BUSY lets the consumer tell "never touched by the engine" apart
        // from "processed".
        bd.insert_control(Control::SG_DISABLE);
        bd.set_status(Status::BUSY);
        bd.set_device_status(0);
        slot.copy_from(bd);

        let prev = self.last;
        match self.batch {
            None => {
                self.batch = Some(Batch {
                    anchor: prev,
                    first: self.put,
                });
            }
            Some(b) if b.anchor != prev => {
                // The previous tail is inside this batch, out of the engine's
                // reach, so it can be chained onto the new tail now.
                self.descriptors[prev].remove_control(Control::SG_DISABLE);
            }
            Some(_) => {
                // The previous tail is the anchor; commit releases it.
            }
        }

        let put = Slot(self.put);
        self.active += 1;
        self.last = self.put;
        self.put = self.advance(self.put);
        Ok(put)
    }

    /// Releases the open batch to the engine. Returns the anchor.
    pub(crate) fn commit(&mut self) -> Result<Slot, DmaError> {
        let batch = match self.batch {
            Some(b) if !self.is_empty() => b,
            _ => return Err(DmaError::SgNothingToCommit),
        };
        if batch.anchor != self.last {
            // Descriptor contents must be in memory before the engine is
            // allowed to run into them.
            fence(Ordering::Release);
            self.descriptors[batch.anchor].remove_control(Control::SG_DISABLE);
        }
        self.batch = None;
        Ok(Slot(batch.anchor))
    }

    /// Takes back the oldest active slot.
    ///
    /// The slot's stop bit is set again on the way out, so that if the engine
    /// is restarted before the slot is reused it will not run past it.
    pub(crate) fn take(&mut self) -> Result<Slot, DmaError> {
        if self.is_empty() {
            return Err(DmaError::SgListEmpty);
        }
        let slot = Slot(self.get);
        self.descriptors[self.get].insert_control(Control::SG_DISABLE);
        self.get = self.advance(self.get);
        self.active -= 1;
        Ok(slot)
    }
}
