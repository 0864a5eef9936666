// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scatter-gather list management and engine start/stop.

use core::sync::atomic::{fence, Ordering};

use crate::regs::{Reg, SwControl};
use crate::trace::{Op, Trace};
use crate::{
    BufferDescriptor, Control, DescriptorRing, DmaChannel, DmaError, Intr,
    RegisterIo, SpinLimit, Slot, Status,
};

/// Where `sg_start` is going to point the engine.
enum Launch {
    /// Write this address to BDA; the engine begins there.
    Fresh(u32),
    /// Leave BDA alone; the engine continues after the descriptor there.
    Resume(u32),
}

impl<'a, R: RegisterIo> DmaChannel<'a, R> {
    /// Turns `memory` into this channel's descriptor ring. The engine must
    /// be able to reach `memory` at bus address `bus_base`.
    ///
    /// A channel gets exactly one ring; a second call is refused with
    /// `SgListExists` and leaves the first ring untouched.
    ///
    /// # Panics
    ///
    /// Under the same conditions as `DescriptorRing::new`.
    pub fn create_sg_list(
        &mut self,
        memory: &'a mut [u32],
        bus_base: u32,
    ) -> Result<(), DmaError> {
        if self.ring.is_some() {
            return self.refuse(Op::CreateSgList, DmaError::SgListExists);
        }
        let ring = DescriptorRing::new(memory, bus_base);
        self.trace.record(Trace::RingCreated {
            slots: ring.len(),
            bus_base,
        });
        self.ring = Some(ring);
        Ok(())
    }

    /// Copies `bd` into the next free slot of the ring and returns that slot.
    ///
    /// The engine won't see it until it is committed with `commit_puts`.
    /// `bd` comes back with `SG_DISABLE` set and its status marked busy, the
    /// same as the copy in the ring.
    pub fn put_descriptor(
        &mut self,
        bd: &BufferDescriptor,
    ) -> Result<Slot, DmaError> {
        let slot = self.with_ring(Op::Put, |r| r.put(bd))?;
        self.trace.record(Trace::Put { slot: slot.index() });
        Ok(slot)
    }

    /// Releases every put since the last commit to the engine in one step.
    pub fn commit_puts(&mut self) -> Result<(), DmaError> {
        let anchor = self.with_ring(Op::Commit, |r| r.commit())?;
        self.trace.record(Trace::Commit {
            anchor: anchor.index(),
        });
        Ok(())
    }

    /// Takes back the oldest active descriptor. Check its status first if you
    /// need to know whether the engine is done with it; this doesn't.
    pub fn get_descriptor(&mut self) -> Result<Slot, DmaError> {
        let slot = self.with_ring(Op::Get, |r| r.take())?;
        self.trace.record(Trace::Get { slot: slot.index() });
        Ok(slot)
    }

    /// Starts (or restarts) scatter-gather processing.
    ///
    /// If the engine has never been pointed at this ring, it is started at
    /// the oldest active descriptor. Otherwise it picks up after the
    /// descriptor it last processed, and that next descriptor has to be new
    /// work: `SgNoData` if it's already been processed, `SgBdNotCommitted`
    /// if it's part of a batch that hasn't been committed.
    pub fn sg_start(&mut self) -> Result<(), DmaError> {
        let launch = match self.plan_start() {
            Ok(l) => l,
            Err(e) => return self.refuse(Op::Start, e),
        };
        match launch {
            Launch::Fresh(bda) => {
                self.regs.write(Reg::BDA, bda);
                self.trace.record(Trace::StartFresh { bda });
            }
            Launch::Resume(bda) => {
                self.trace.record(Trace::Resume { bda });
            }
        }

        // Descriptor memory has to be settled before the engine can fetch.
        fence(Ordering::Release);
        // Enable first; the engine stays put while DMAC still has the stop
        // bit from the descriptor it finished on, and clearing that bit is
        // what lets it go.
        self.regs.modify(Reg::SWCR, |v| v | SwControl::SG_ENABLE.bits());
        self.regs
            .modify(Reg::DMAC, |v| v & !Control::SG_DISABLE.bits());
        Ok(())
    }

    fn plan_start(&self) -> Result<Launch, DmaError> {
        let ring = self.ring.as_ref().ok_or(DmaError::SgNoList)?;
        if ring.is_empty() {
            return Err(DmaError::SgListEmpty);
        }
        if self.status().contains(Status::SG_BUSY) {
            return Err(DmaError::SgIsStarted);
        }

        let bda = self.regs.read(Reg::BDA);
        // BDA is zero out of reset. Anything that isn't one of our
        // descriptors is treated the same way: the engine has nothing of
        // ours to resume from.
        let Some(done) = (bda != 0).then(|| ring.slot_of(bda)).flatten()
        else {
            return Ok(Launch::Fresh(ring.bus_addr(ring.get_slot())));
        };

        let next = ring.next(done);
        if !ring.descriptor(next).status().contains(Status::BUSY) {
            return Err(DmaError::SgNoData);
        }
        if ring.is_uncommitted(next) {
            return Err(DmaError::SgBdNotCommitted);
        }
        Ok(Launch::Resume(bda))
    }

    /// Stops scatter-gather processing and returns the bus address of the
    /// descriptor the engine finished on.
    ///
    /// The engine completes the descriptor it's working on before it
    /// acknowledges, so this waits, up to `limit`. On `StopTimeout` the
    /// engine has been told to stop but hasn't said so; it may still be
    /// running.
    pub fn sg_stop(&mut self, limit: SpinLimit) -> Result<u32, DmaError> {
        let swcr = SwControl::from_bits_retain(self.regs.read(Reg::SWCR));
        if !swcr.contains(SwControl::SG_ENABLE) {
            return self.refuse(Op::Stop, DmaError::SgIsStopped);
        }

        // Clear any stale acknowledgement so we only see the one for this
        // request.
        self.regs.write(Reg::IS, Intr::SG_DISABLE_ACK.bits());
        self.regs
            .write(Reg::SWCR, (swcr - SwControl::SG_ENABLE).bits());

        let mut polls = 0u32;
        while !self.intr_status().contains(Intr::SG_DISABLE_ACK) {
            if let SpinLimit::Polls(max) = limit {
                polls += 1;
                if polls >= max {
                    return self.refuse(Op::Stop, DmaError::StopTimeout);
                }
            }
            core::hint::spin_loop();
        }
        self.regs.write(Reg::IS, Intr::SG_DISABLE_ACK.bits());

        let bda = self.regs.read(Reg::BDA);
        self.trace.record(Trace::Stop { bda });
        Ok(bda)
    }

    /// Runs `body` against the ring, recording a refusal for `op` if there
    /// is no ring or `body` fails.
    fn with_ring<T>(
        &mut self,
        op: Op,
        body: impl FnOnce(&mut DescriptorRing<'a>) -> Result<T, DmaError>,
    ) -> Result<T, DmaError> {
        let result = match self.ring.as_mut() {
            Some(ring) => body(ring),
            None => Err(DmaError::SgNoList),
        };
        match result {
            Ok(v) => Ok(v),
            Err(e) => self.refuse(op, e),
        }
    }
}
