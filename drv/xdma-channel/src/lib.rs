// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for one channel of the Xilinx OPB/PLB DMA controller, primarily in
//! scatter-gather mode.
//!
//! A channel is brought up with `DmaChannel::initialize`, given a block of
//! descriptor memory once with `create_sg_list`, and then driven by its
//! consumer (usually an Ethernet MAC driver) through two paths:
//!
//! - submission: fill out a `BufferDescriptor`, `put_descriptor` it,
//!   `commit_puts` once the batch is complete, and `sg_start` the engine;
//! - completion: when the engine reports packets done (or the coalescing
//!   timer fires), `get_descriptor` each finished buffer and
//!   `decrement_pkt_count` once per packet.
//!
//! `submit` and `handle_interrupt` package those two paths the way a MAC
//! normally uses them.
//!
//! # Concurrency
//!
//! Nothing in here locks. Operations on one channel must not interleave, so
//! if you call into a channel from both interrupt and task context, mask the
//! interrupt around task-context calls (see `irq::InterruptGate`). Separate
//! channels are independent.
//!
//! This crate is portable so that it can be tested on the host: register
//! access goes through `regs::RegisterIo`, which on hardware is the
//! `regs::RegisterBlock` overlay.

#![cfg_attr(not(test), no_std)]

pub mod bd;
mod coalesce;
pub mod config;
pub mod error;
pub mod irq;
pub mod regs;
pub mod ring;
mod sg;
pub mod trace;

#[cfg(test)]
mod sim;

pub use bd::BufferDescriptor;
pub use coalesce::{IrqOutcome, Packet};
pub use config::{ChannelConfig, Direction, SpinLimit};
pub use error::DmaError;
pub use regs::{Control, Intr, RegisterBlock, RegisterIo, Status, Version};
pub use ring::{DescriptorRing, Slot};

use crate::regs::{Reg, SwControl, RESET_MASK};
use crate::trace::{Op, Trace, TraceBuf};

/// Entries kept in each channel's trace ring.
pub const TRACE_DEPTH: usize = 32;

pub struct DmaChannel<'a, R: RegisterIo> {
    regs: R,
    direction: Direction,
    /// Descriptor ring, once `create_sg_list` has been called. Never replaced
    /// after that.
    ring: Option<DescriptorRing<'a>>,
    trace: TraceBuf<TRACE_DEPTH>,
}

impl<'a, R: RegisterIo> DmaChannel<'a, R> {
    /// Resets the channel behind `regs` and returns a driver for it.
    ///
    /// The channel has no descriptor ring yet; call `create_sg_list` before
    /// using any scatter-gather operation.
    pub fn initialize(regs: R, direction: Direction) -> Self {
        let mut this = Self {
            regs,
            direction,
            ring: None,
            trace: TraceBuf::new(),
        };
        this.reset();
        this
    }

    /// Resets the hardware. This stops the engine and clears its registers,
    /// but leaves the descriptor ring and its cursors alone, since the
    /// consumer still owns whatever buffers are attached to them.
    pub fn reset(&mut self) {
        self.regs.write(Reg::RST, RESET_MASK);
        self.trace.record(Trace::Reset);
    }

    /// Resets the channel and checks that the status and software control
    /// registers came back at their reset values.
    ///
    /// This is destructive: a running channel is stopped.
    pub fn self_test(&mut self) -> Result<(), DmaError> {
        self.reset();
        let result = if self.regs.read(Reg::DMAS) != 0
            || self.regs.read(Reg::SWCR) != 0
        {
            Err(DmaError::ResetRegisterError)
        } else {
            Ok(())
        };
        self.trace.record(Trace::SelfTest(result));
        result
    }

    pub fn version(&self) -> Version {
        Version::from(self.regs.read(Reg::MI))
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.regs.read(Reg::DMAC))
    }

    pub fn set_control(&mut self, c: Control) {
        self.regs.write(Reg::DMAC, c.bits());
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.regs.read(Reg::DMAS))
    }

    /// Pending interrupt conditions.
    pub fn intr_status(&self) -> Intr {
        Intr::from_bits_retain(self.regs.read(Reg::IS))
    }

    /// Clears the given pending interrupt conditions.
    pub fn ack_intr(&mut self, which: Intr) {
        self.regs.write(Reg::IS, which.bits());
    }

    pub fn intr_enable(&self) -> Intr {
        Intr::from_bits_retain(self.regs.read(Reg::IE))
    }

    pub fn set_intr_enable(&mut self, which: Intr) {
        self.regs.write(Reg::IE, which.bits());
    }

    /// Whether scatter-gather processing is enabled in software control.
    /// The engine may still be idle if it hit a stop bit.
    pub fn is_sg_enabled(&self) -> bool {
        SwControl::from_bits_retain(self.regs.read(Reg::SWCR))
            .contains(SwControl::SG_ENABLE)
    }

    /// Starts a simple (non-scatter-gather) transfer of `len` bytes.
    ///
    /// Set up the address increment/local bits with `set_control` first.
    /// Writing the length register is what starts the engine, so it goes
    /// last. Poll `transfer_done` or wait for `Intr::DMA_DONE`.
    pub fn transfer(
        &mut self,
        source: u32,
        destination: u32,
        len: u32,
    ) -> Result<(), DmaError> {
        if len == 0 {
            return self.refuse(Op::Transfer, DmaError::InvalidParam);
        }
        if self.is_sg_enabled() {
            return self.refuse(Op::Transfer, DmaError::SgIsStarted);
        }
        if self.status().contains(Status::BUSY) {
            return self.refuse(Op::Transfer, DmaError::DeviceBusy);
        }
        self.regs.write(Reg::SA, source);
        self.regs.write(Reg::DA, destination);
        self.regs.write(Reg::LEN, len);
        self.trace.record(Trace::Transfer { len });
        Ok(())
    }

    /// Checks on a simple transfer: `Ok(false)` while it's running,
    /// `Ok(true)` once it's finished cleanly.
    pub fn transfer_done(&self) -> Result<bool, DmaError> {
        let s = self.status();
        if s.intersects(Status::BUS_ERROR | Status::BUS_TIMEOUT) {
            Err(DmaError::TransferError)
        } else {
            Ok(!s.contains(Status::BUSY))
        }
    }

    /// The descriptor ring, if one has been created.
    pub fn ring(&self) -> Option<&DescriptorRing<'a>> {
        self.ring.as_ref()
    }

    /// The descriptor in `slot`, for inspecting a completion or setting its
    /// lock. `None` if there's no ring yet, or if `slot` isn't in it.
    pub fn descriptor(&self, slot: Slot) -> Option<&'a BufferDescriptor> {
        self.ring.as_ref()?.descriptors().get(slot.index())
    }

    /// True when no descriptors are waiting to be taken back, including when
    /// there is no ring at all.
    pub fn is_sg_list_empty(&self) -> bool {
        self.ring.as_ref().map_or(true, |r| r.is_empty())
    }

    pub fn trace(&self) -> &TraceBuf<TRACE_DEPTH> {
        &self.trace
    }

    fn refuse<T>(&mut self, op: Op, e: DmaError) -> Result<T, DmaError> {
        self.trace.record(Trace::Refused(op, e));
        Err(e)
    }
}
