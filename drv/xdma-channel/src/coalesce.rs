// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt coalescing, and the submit/reclaim helpers built on top of it.
//!
//! The engine counts finished packets in UPC and raises `PKT_THRESHOLD` once
//! the count reaches PCT, or `PKT_WAIT_BOUND` if a packet has been sitting
//! for PWB milliseconds without the threshold being reached. Software owns
//! the other half of the count: it decrements UPC once for each packet it
//! takes back.

use crate::regs::{Reg, PKT_WAIT_BOUND_LIMIT};
use crate::trace::{Op, Trace};
use crate::{
    irq::InterruptGate, BufferDescriptor, ChannelConfig, Direction,
    DmaChannel, DmaError, Intr, RegisterIo, Slot,
};

/// One reclaimed packet. Its buffers are `buffers` consecutive slots starting
/// at `first` (walk them with `DescriptorRing::next`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub first: Slot,
    pub buffers: usize,
    /// Sum of the length words of the packet's descriptors.
    pub bytes: u32,
}

/// What `handle_interrupt` did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IrqOutcome {
    /// Interrupt conditions that were pending, and have been acknowledged.
    pub pending: Intr,
    pub packets: usize,
    /// Set if reclaiming stopped early.
    pub reclaim_error: Option<DmaError>,
    /// The engine hit a stop bit and was successfully restarted.
    pub restarted: bool,
}

impl IrqOutcome {
    /// The engine flagged a bus error or timeout. The driver doesn't try to
    /// recover from this; the consumer usually resets the channel.
    pub fn dma_error(&self) -> bool {
        self.pending.contains(Intr::DMA_ERROR)
    }
}

impl<'a, R: RegisterIo> DmaChannel<'a, R> {
    /// Packets the engine has finished that software hasn't accounted for.
    pub fn pkt_count(&self) -> u32 {
        self.regs.read(Reg::UPC)
    }

    /// Accounts for one reclaimed packet. Does nothing if the count is
    /// already zero.
    pub fn decrement_pkt_count(&mut self) {
        let count = self.pkt_count();
        if count > 0 {
            self.regs.write(Reg::UPC, 1);
            self.trace.record(Trace::PktDecrement {
                remaining: count - 1,
            });
        }
    }

    /// Sets how many packets the engine collects before raising
    /// `PKT_THRESHOLD`. Zero disables the threshold interrupt.
    pub fn set_pkt_threshold(&mut self, count: u8) -> Result<(), DmaError> {
        if self.is_sg_enabled() {
            return self.refuse(Op::Configure, DmaError::SgIsStarted);
        }
        self.regs.write(Reg::PCT, u32::from(count));
        Ok(())
    }

    pub fn pkt_threshold(&self) -> u8 {
        self.regs.read(Reg::PCT) as u8
    }

    /// Sets the packet wait bound in milliseconds. Zero disables it.
    pub fn set_pkt_wait_bound(&mut self, ms: u16) -> Result<(), DmaError> {
        if ms >= PKT_WAIT_BOUND_LIMIT {
            return self.refuse(Op::Configure, DmaError::InvalidParam);
        }
        if self.is_sg_enabled() {
            return self.refuse(Op::Configure, DmaError::SgIsStarted);
        }
        self.regs.write(Reg::PWB, u32::from(ms));
        Ok(())
    }

    pub fn pkt_wait_bound(&self) -> u16 {
        (self.regs.read(Reg::PWB) & 0x3FF) as u16
    }

    /// Applies `cfg` to a stopped channel. Nothing is written unless every
    /// setting is acceptable.
    pub fn configure(&mut self, cfg: &ChannelConfig) -> Result<(), DmaError> {
        if cfg.pkt_wait_bound >= PKT_WAIT_BOUND_LIMIT {
            return self.refuse(Op::Configure, DmaError::InvalidParam);
        }
        self.set_pkt_threshold(cfg.pkt_threshold)?;
        self.set_pkt_wait_bound(cfg.pkt_wait_bound)?;
        self.set_intr_enable(cfg.interrupts);
        Ok(())
    }

    /// Hands `bd` to the engine the way a MAC driver does, with `gate`
    /// holding off the channel's interrupt for the duration.
    ///
    /// Receive buffers are committed one at a time. Send buffers are
    /// committed when `bd` ends a packet, so the engine never sees part of a
    /// frame. With `kick`, the engine is then (re)started; start refusals
    /// that just mean it's already busy are not errors here.
    pub fn submit(
        &mut self,
        gate: &impl InterruptGate,
        bd: &BufferDescriptor,
        kick: bool,
    ) -> Result<Slot, DmaError> {
        gate.with_masked(|| {
            let slot = self.put_descriptor(bd)?;
            let ends_batch = match self.direction {
                Direction::Recv => true,
                Direction::Send => bd.is_last_control(),
            };
            if ends_batch {
                self.commit_puts()?;
                if kick {
                    match self.sg_start() {
                        Err(e) if !e.is_benign() => return Err(e),
                        _ => (),
                    }
                }
            }
            Ok(slot)
        })
    }

    /// Takes back every packet the engine has reported finished, calling
    /// `on_packet` for each and decrementing the packet count after it.
    ///
    /// Returns the number of packets reclaimed. If a get fails partway
    /// through, the packets already passed to `on_packet` stay reclaimed and
    /// the error is returned.
    pub fn reclaim_packets(
        &mut self,
        mut on_packet: impl FnMut(&Packet),
    ) -> Result<usize, DmaError> {
        let pending = self.pkt_count();
        let mut reclaimed = 0;
        for _ in 0..pending {
            let first = self.get_descriptor()?;
            let mut packet = Packet {
                first,
                buffers: 0,
                bytes: 0,
            };
            let mut slot = first;
            loop {
                let d = self.descriptor(slot).ok_or(DmaError::SgNoList)?;
                packet.buffers += 1;
                packet.bytes = packet.bytes.wrapping_add(d.length());
                if self.ends_packet(d) {
                    break;
                }
                slot = self.get_descriptor()?;
            }

            self.trace.record(Trace::Packet {
                first: first.index(),
                buffers: packet.buffers,
            });
            on_packet(&packet);
            self.decrement_pkt_count();
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// Services the channel's interrupt: reclaims finished packets, restarts
    /// the engine if it ran off the end of committed work, and acknowledges
    /// exactly the conditions it saw.
    pub fn handle_interrupt(
        &mut self,
        on_packet: impl FnMut(&Packet),
    ) -> IrqOutcome {
        let pending = self.intr_status();
        self.trace.record(Trace::Irq(pending.bits()));

        let mut outcome = IrqOutcome {
            pending,
            packets: 0,
            reclaim_error: None,
            restarted: false,
        };
        if pending.intersects(Intr::RECLAIM) {
            match self.reclaim_packets(on_packet) {
                Ok(n) => outcome.packets = n,
                Err(e) => outcome.reclaim_error = Some(e),
            }
            // More work may have been committed while the engine was
            // finishing; if not, this is a harmless refusal.
            if pending.contains(Intr::SG_END) {
                outcome.restarted = self.sg_start().is_ok();
            }
        }
        self.ack_intr(pending);
        outcome
    }

    fn ends_packet(&self, d: &BufferDescriptor) -> bool {
        match self.direction {
            Direction::Send => d.is_last_control(),
            Direction::Recv => d.is_last_status(),
        }
    }
}
