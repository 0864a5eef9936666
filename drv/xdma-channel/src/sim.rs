// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated DMA channel for host tests.
//!
//! Registers live in `Cell`s and behave the way the driver relies on: reset
//! clears everything, interrupt status is write-one-to-clear, a write of 1 to
//! UPC decrements it, and clearing `SG_ENABLE` is acknowledged right away.
//!
//! The engine itself only moves when a test calls `run`, which processes
//! descriptors from the ring the way the hardware would until it hits one with
//! a stop bit.

use core::cell::{Cell, RefCell};

use crate::regs::{Reg, SwControl, RESET_MASK};
use crate::{Control, DescriptorRing, Intr, RegisterIo, Status};

/// MI value: version 2.00a.
const MODULE_ID: u32 = 2 << 28;

pub struct SimEngine {
    regs: [Cell<u32>; Reg::COUNT],
    /// BDA was written since the engine last ran, so it starts at BDA rather
    /// than after it.
    fresh: Cell<bool>,
    acks_stop: Cell<bool>,
    status_after_reset: Cell<u32>,
    /// Mark every descriptor as the end of a received frame.
    end_packets: Cell<bool>,
    writes: RefCell<Vec<(Reg, u32)>>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            regs: core::array::from_fn(|_| Cell::new(0)),
            fresh: Cell::new(false),
            acks_stop: Cell::new(true),
            status_after_reset: Cell::new(0),
            end_packets: Cell::new(false),
            writes: RefCell::new(Vec::new()),
        }
    }

    pub fn peek(&self, reg: Reg) -> u32 {
        self.regs[reg.index()].get()
    }

    /// Sets a register directly, with none of the side effects of a driver
    /// write and without logging it.
    pub fn poke(&self, reg: Reg, value: u32) {
        self.regs[reg.index()].set(value);
    }

    pub fn never_ack_stop(&self) {
        self.acks_stop.set(false);
    }

    /// Makes DMAS come out of reset with `status` instead of zero.
    pub fn stick_status(&self, status: u32) {
        self.status_after_reset.set(status);
    }

    pub fn end_packets(&self, every_descriptor: bool) {
        self.end_packets.set(every_descriptor);
    }

    /// Register writes made by the driver, oldest first.
    pub fn writes(&self) -> Vec<(Reg, u32)> {
        self.writes.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    fn raise(&self, which: Intr) {
        self.poke(Reg::IS, self.peek(Reg::IS) | which.bits());
    }

    /// Processes descriptors until one with `SG_DISABLE` set, returning how
    /// many were processed. Does nothing if the engine isn't enabled or is
    /// still held by the stop bit in DMAC.
    pub fn run(&self, ring: &DescriptorRing<'_>) -> usize {
        let enabled = SwControl::from_bits_retain(self.peek(Reg::SWCR))
            .contains(SwControl::SG_ENABLE);
        let held = Control::from_bits_retain(self.peek(Reg::DMAC))
            .contains(Control::SG_DISABLE);
        if !enabled || held {
            return 0;
        }

        let bda = self.peek(Reg::BDA);
        let mut addr = if self.fresh.replace(false) {
            bda
        } else {
            let at = ring.slot_of(bda).expect("engine parked off the ring");
            ring.descriptor(at).next_ptr()
        };

        let mut processed = 0;
        loop {
            let slot = ring.slot_of(addr).expect("next pointer off the ring");
            let d = ring.descriptor(slot);
            let control = d.control();

            let ends =
                self.end_packets.get() || control.contains(Control::LAST_BD);
            d.set_status(if ends { Status::LAST_BD } else { Status::empty() });
            if ends {
                let upc = self.peek(Reg::UPC) + 1;
                self.poke(Reg::UPC, upc);
                self.raise(Intr::PKT_DONE);
                let pct = self.peek(Reg::PCT);
                if pct != 0 && upc >= pct {
                    self.raise(Intr::PKT_THRESHOLD);
                }
            }

            // The engine loads each descriptor's control word into DMAC.
            self.poke(Reg::BDA, addr);
            self.poke(Reg::DMAC, control.bits());
            processed += 1;

            if control.contains(Control::SG_DISABLE) {
                self.raise(Intr::SG_END);
                return processed;
            }
            assert!(
                processed <= ring.len(),
                "no stop bit anywhere in the ring"
            );
            addr = d.next_ptr();
        }
    }
}

impl RegisterIo for SimEngine {
    fn read(&self, reg: Reg) -> u32 {
        if reg == Reg::MI {
            MODULE_ID
        } else {
            self.peek(reg)
        }
    }

    fn write(&self, reg: Reg, value: u32) {
        self.writes.borrow_mut().push((reg, value));

        if reg == Reg::RST {
            if value == RESET_MASK {
                for r in &self.regs {
                    r.set(0);
                }
                self.poke(Reg::DMAS, self.status_after_reset.get());
                self.fresh.set(false);
            }
        } else if reg == Reg::IS {
            self.poke(Reg::IS, self.peek(Reg::IS) & !value);
        } else if reg == Reg::SWCR {
            let was = SwControl::from_bits_retain(self.peek(Reg::SWCR));
            let now = SwControl::from_bits_retain(value);
            self.poke(Reg::SWCR, value);
            if was.contains(SwControl::SG_ENABLE)
                && !now.contains(SwControl::SG_ENABLE)
                && self.acks_stop.get()
            {
                self.raise(Intr::SG_DISABLE_ACK);
            }
        } else if reg == Reg::UPC {
            if value == 1 {
                self.poke(Reg::UPC, self.peek(Reg::UPC).saturating_sub(1));
            }
        } else if reg == Reg::BDA {
            self.poke(Reg::BDA, value);
            self.fresh.set(true);
        } else if reg == Reg::LEN {
            // Simple transfers finish instantly.
            self.poke(Reg::LEN, value);
            self.raise(Intr::DMA_DONE);
        } else {
            self.poke(reg, value);
        }
    }
}
