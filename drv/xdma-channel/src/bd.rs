// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Buffer descriptors.
//!
//! A buffer descriptor is ten 32-bit words that the DMA engine reads and
//! writes directly in memory. The word order below is part of the hardware
//! contract and must not change:
//!
//! ```text
//!   word  field
//!   0     device status   (opaque, written by the device)
//!   1     control         (see `Control`)
//!   2     source address
//!   3     destination address
//!   4     length
//!   5     status          (see `Status`, written by the engine)
//!   6     next pointer    (bus address of the next descriptor in the ring)
//!   7     id              (opaque, for the consumer)
//!   8     flags           (software only)
//!   9     requested length
//! ```
//!
//! Because the engine is another mutator of these words, every word is a
//! `VolatileCell` and all accessors work through `&self`. Holding a shared
//! reference to a descriptor the engine owns is fine; what you read may just
//! change underneath you.

use core::fmt;

use vcell::VolatileCell;

use crate::regs::{Control, Status};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(usize)]
enum Word {
    DeviceStatus = 0,
    Control,
    Source,
    Destination,
    Length,
    Status,
    NextPtr,
    Id,
    Flags,
    RequestedLength,
}

/// Software-only flag: the consumer is still reading this descriptor, so the
/// ring must not overwrite it.
const FLAG_LOCKED: u32 = 1 << 0;

#[repr(C)]
pub struct BufferDescriptor {
    words: [VolatileCell<u32>; BufferDescriptor::WORDS],
}

static_assertions::const_assert_eq!(
    core::mem::size_of::<BufferDescriptor>(),
    BufferDescriptor::WORDS * 4
);
static_assertions::const_assert_eq!(
    core::mem::align_of::<BufferDescriptor>(),
    4
);

impl BufferDescriptor {
    /// Number of 32-bit words in a descriptor.
    pub const WORDS: usize = 10;
    /// Size of a descriptor in bytes.
    pub const SIZE: usize = Self::WORDS * 4;

    /// Produces an all-zero descriptor, suitable for filling out and handing
    /// to `put_descriptor`.
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: VolatileCell<u32> = VolatileCell::new(0);
        Self {
            words: [ZERO; Self::WORDS],
        }
    }

    #[inline(always)]
    fn word(&self, w: Word) -> u32 {
        self.words[w as usize].get()
    }

    #[inline(always)]
    fn set_word(&self, w: Word, v: u32) {
        self.words[w as usize].set(v)
    }

    /// Zeroes every word, including the next pointer.
    pub fn initialize(&self) {
        for w in &self.words {
            w.set(0);
        }
    }

    pub fn device_status(&self) -> u32 {
        self.word(Word::DeviceStatus)
    }

    pub fn set_device_status(&self, v: u32) {
        self.set_word(Word::DeviceStatus, v)
    }

    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.word(Word::Control))
    }

    pub fn set_control(&self, c: Control) {
        self.set_word(Word::Control, c.bits())
    }

    /// Sets bits in the control word, leaving the others alone.
    pub fn insert_control(&self, c: Control) {
        self.set_control(self.control() | c)
    }

    /// Clears bits in the control word, leaving the others alone.
    pub fn remove_control(&self, c: Control) {
        self.set_control(self.control() - c)
    }

    pub fn source(&self) -> u32 {
        self.word(Word::Source)
    }

    pub fn set_source(&self, addr: u32) {
        self.set_word(Word::Source, addr)
    }

    pub fn destination(&self) -> u32 {
        self.word(Word::Destination)
    }

    pub fn set_destination(&self, addr: u32) {
        self.set_word(Word::Destination, addr)
    }

    /// Current length word. The engine counts this down as it transfers, so
    /// after completion it may differ from `requested_length`.
    pub fn length(&self) -> u32 {
        self.word(Word::Length)
    }

    /// Sets the transfer length, recording it as the requested length too.
    pub fn set_length(&self, len: u32) {
        self.set_word(Word::Length, len);
        self.set_word(Word::RequestedLength, len);
    }

    pub fn requested_length(&self) -> u32 {
        self.word(Word::RequestedLength)
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.word(Word::Status))
    }

    pub fn set_status(&self, s: Status) {
        self.set_word(Word::Status, s.bits())
    }

    /// Bus address of the descriptor after this one in its ring.
    pub fn next_ptr(&self) -> u32 {
        self.word(Word::NextPtr)
    }

    /// Only the ring links descriptors.
    pub(crate) fn set_next_ptr(&self, addr: u32) {
        self.set_word(Word::NextPtr, addr)
    }

    pub fn id(&self) -> u32 {
        self.word(Word::Id)
    }

    pub fn set_id(&self, id: u32) {
        self.set_word(Word::Id, id)
    }

    pub fn flags(&self) -> u32 {
        self.word(Word::Flags)
    }

    pub fn lock(&self) {
        self.set_word(Word::Flags, self.flags() | FLAG_LOCKED)
    }

    pub fn unlock(&self) {
        self.set_word(Word::Flags, self.flags() & !FLAG_LOCKED)
    }

    pub fn is_locked(&self) -> bool {
        self.flags() & FLAG_LOCKED != 0
    }

    /// Whether software marked this descriptor as the end of a packet. Send
    /// channels use this to find packet boundaries.
    pub fn is_last_control(&self) -> bool {
        self.control().contains(Control::LAST_BD)
    }

    /// Whether the engine reported that this descriptor ended a packet.
    /// Receive channels use this to find packet boundaries.
    pub fn is_last_status(&self) -> bool {
        self.status().contains(Status::LAST_BD)
    }

    /// Copies every word of `other` into `self`, except the next pointer,
    /// which belongs to the ring `self` lives in.
    pub fn copy_from(&self, other: &BufferDescriptor) {
        for (i, (dst, src)) in self.words.iter().zip(&other.words).enumerate() {
            if i != Word::NextPtr as usize {
                dst.set(src.get());
            }
        }
    }

    /// Reads out all ten words, in hardware order.
    pub fn words(&self) -> [u32; Self::WORDS] {
        core::array::from_fn(|i| self.words[i].get())
    }
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferDescriptor")
            .field("control", &self.control())
            .field("source", &self.source())
            .field("destination", &self.destination())
            .field("length", &self.length())
            .field("status", &self.status())
            .field("device_status", &self.device_status())
            .field("next_ptr", &self.next_ptr())
            .field("id", &self.id())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_land_at_hardware_offsets() {
        let bd = BufferDescriptor::new();
        bd.set_device_status(0xD0);
        bd.set_control(Control::SOURCE_INCR);
        bd.set_source(0x1000);
        bd.set_destination(0x2000);
        bd.set_length(64);
        bd.set_status(Status::BUSY);
        bd.set_next_ptr(0x3000);
        bd.set_id(7);
        bd.lock();

        assert_eq!(
            bd.words(),
            [
                0xD0,
                Control::SOURCE_INCR.bits(),
                0x1000,
                0x2000,
                64,
                Status::BUSY.bits(),
                0x3000,
                7,
                1,
                64,
            ]
        );
    }

    #[test]
    fn copy_keeps_destination_link() {
        let src = BufferDescriptor::new();
        src.set_source(0xAAAA_0000);
        src.set_length(1500);
        src.set_id(42);
        src.set_next_ptr(0xDEAD_0000);

        let dst = BufferDescriptor::new();
        dst.set_next_ptr(0x0000_BEEF);
        dst.copy_from(&src);

        assert_eq!(dst.source(), 0xAAAA_0000);
        assert_eq!(dst.length(), 1500);
        assert_eq!(dst.requested_length(), 1500);
        assert_eq!(dst.id(), 42);
        assert_eq!(dst.next_ptr(), 0x0000_BEEF);
    }

    #[test]
    fn lock_only_touches_lock_bit() {
        let bd = BufferDescriptor::new();
        assert!(!bd.is_locked());
        bd.lock();
        assert!(bd.is_locked());
        bd.unlock();
        assert!(!bd.is_locked());
        assert_eq!(bd.flags(), 0);
    }

    #[test]
    fn control_edits_preserve_other_bits() {
        let bd = BufferDescriptor::new();
        bd.set_control(Control::DEST_INCR | Control::LAST_BD);
        bd.insert_control(Control::SG_DISABLE);
        assert!(bd.control().contains(Control::SG_DISABLE));
        bd.remove_control(Control::SG_DISABLE);
        assert_eq!(bd.control(), Control::DEST_INCR | Control::LAST_BD);
        assert!(bd.is_last_control());
        assert!(!bd.is_last_status());
    }
}
