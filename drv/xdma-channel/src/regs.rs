// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register map of one DMA channel, and the trait the driver uses to reach it.
//!
//! The map and bit positions are fixed by the IP core. The only abstraction
//! here is `RegisterIo`, which exists so that the same driver can sit on top
//! of real MMIO (`RegisterBlock`) or on top of a simulated engine in tests.

use bitflags::bitflags;
use vcell::VolatileCell;

/// Byte offset of a channel register from the channel base address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Reg(usize);

impl Reg {
    /// Reset register (write only).
    pub const RST: Self = Self(0x00);
    /// Module identification register (read only, shares RST's offset).
    pub const MI: Self = Self(0x00);
    /// DMA control register.
    pub const DMAC: Self = Self(0x04);
    /// Source address, simple DMA only.
    pub const SA: Self = Self(0x08);
    /// Destination address, simple DMA only.
    pub const DA: Self = Self(0x0C);
    /// Length; writing it starts a simple DMA transfer.
    pub const LEN: Self = Self(0x10);
    /// DMA status register.
    pub const DMAS: Self = Self(0x14);
    /// Bus address of the descriptor the engine processed last.
    pub const BDA: Self = Self(0x18);
    /// Software control register.
    pub const SWCR: Self = Self(0x1C);
    /// Unserviced packet count.
    pub const UPC: Self = Self(0x20);
    /// Packet count threshold.
    pub const PCT: Self = Self(0x24);
    /// Packet wait bound, in milliseconds.
    pub const PWB: Self = Self(0x28);
    /// Interrupt status; write one to clear.
    pub const IS: Self = Self(0x2C);
    /// Interrupt enable.
    pub const IE: Self = Self(0x30);

    /// Number of 32-bit registers in a channel's window.
    pub const COUNT: usize = 13;

    /// Index of this register in an array of 32-bit words.
    pub const fn index(self) -> usize {
        self.0 / 4
    }
}

/// Value written to `RST` to reset the channel.
pub const RESET_MASK: u32 = 0x0000_000A;

/// Largest value the packet wait bound register can hold, plus one.
pub const PKT_WAIT_BOUND_LIMIT: u16 = 1024;

/// Access to a channel's registers.
///
/// Implementations must perform each access exactly once and in program
/// order; the scatter-gather start sequence depends on it.
pub trait RegisterIo {
    fn read(&self, reg: Reg) -> u32;
    fn write(&self, reg: Reg, value: u32);

    /// Read-modify-write of a single register.
    #[inline(always)]
    fn modify(&self, reg: Reg, f: impl FnOnce(u32) -> u32) {
        let v = self.read(reg);
        self.write(reg, f(v));
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// Overlay for a channel's register window in MMIO space.
#[repr(C)]
pub struct RegisterBlock {
    words: [VolatileCell<u32>; Reg::COUNT],
}

static_assertions::const_assert_eq!(
    core::mem::size_of::<RegisterBlock>(),
    Reg::COUNT * 4
);

impl RegisterBlock {
    /// Produces a reference to the register window at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the 4-byte-aligned base address of a DMA channel's
    /// register window, mapped uncached, and nothing else may be
    /// treating that window as ordinary memory.
    pub unsafe fn at(base: usize) -> &'static Self {
        unsafe { &*(base as *const Self) }
    }
}

impl RegisterIo for RegisterBlock {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u32 {
        self.words[reg.index()].get()
    }

    #[inline(always)]
    fn write(&self, reg: Reg, value: u32) {
        self.words[reg.index()].set(value)
    }
}

bitflags! {
    /// DMA control word. The same layout is used by the `DMAC` register and
    /// by the control word of every buffer descriptor.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Control: u32 {
        const SOURCE_INCR = 1 << 31;
        const DEST_INCR = 1 << 30;
        const SOURCE_LOCAL = 1 << 29;
        const DEST_LOCAL = 1 << 28;
        /// Stop scatter-gather processing after this descriptor.
        const SG_DISABLE = 1 << 27;
        const GEN_BD_INTR = 1 << 26;
        /// This descriptor ends a packet.
        const LAST_BD = 1 << 25;
        const _ = !0;
    }
}

bitflags! {
    /// DMA status word, shared by the `DMAS` register and descriptor status.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Status: u32 {
        /// Set by software on put; cleared by the engine once processed.
        const BUSY = 1 << 31;
        const BUS_ERROR = 1 << 30;
        const BUS_TIMEOUT = 1 << 29;
        /// The engine finished the descriptor that ends a packet.
        const LAST_BD = 1 << 28;
        /// Register only: scatter-gather engine is walking descriptors.
        const SG_BUSY = 1 << 27;
        const _ = !0;
    }
}

bitflags! {
    /// Software control register.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct SwControl: u32 {
        const SG_ENABLE = 1 << 31;
        const _ = !0;
    }
}

bitflags! {
    /// Interrupt status and enable bits.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Intr: u32 {
        const DMA_DONE = 1 << 0;
        const DMA_ERROR = 1 << 1;
        const PKT_DONE = 1 << 2;
        const PKT_THRESHOLD = 1 << 3;
        const PKT_WAIT_BOUND = 1 << 4;
        const SG_DISABLE_ACK = 1 << 5;
        const SG_END = 1 << 6;
        const BD = 1 << 7;
        const _ = !0;
    }
}

impl Intr {
    /// Conditions on which a consumer should drain completed packets.
    pub const RECLAIM: Self = Self::PKT_THRESHOLD
        .union(Self::PKT_WAIT_BOUND)
        .union(Self::SG_END);

    /// Interrupts a scatter-gather consumer normally wants enabled.
    pub const SG_DEFAULT: Self = Self::DMA_ERROR.union(Self::RECLAIM);
}

/// IP core version, decoded from the module identification register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    /// Revision letter, `'a'` for zero.
    pub rev: char,
}

impl From<u32> for Version {
    fn from(mi: u32) -> Self {
        let major = (mi >> 28) as u8;
        let minor = ((mi >> 21) & 0x7F) as u8;
        let rev = ((mi >> 16) & 0x1F) as u8;
        Self {
            major,
            minor,
            rev: char::from(b'a' + rev),
        }
    }
}
