// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-channel trace ring.
//!
//! Every state transition a channel makes, and every request it refuses, is
//! recorded here as a small `Copy` payload. The ring keeps the most recent
//! `N` entries; an entry identical to the one before it bumps that entry's
//! count instead of taking a new slot, so a consumer spinning on `SgNoData`
//! doesn't wipe out the history that explains it.
//!
//! Each channel owns its own ring (rather than sharing a module-level static)
//! because a MAC typically drives two channels, send and receive, and their
//! histories are only useful apart. Read it from a debugger, or through
//! `DmaChannel::trace` in tests.
//!
//! Building with the `trace-disabled` feature turns `record` into a no-op.

use heapless::Deque;

use crate::error::DmaError;

/// Operation that refused a request, for `Trace::Refused`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    CreateSgList,
    Put,
    Commit,
    Get,
    Start,
    Stop,
    Configure,
    Transfer,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trace {
    Reset,
    SelfTest(Result<(), DmaError>),
    RingCreated { slots: usize, bus_base: u32 },
    Put { slot: usize },
    Commit { anchor: usize },
    Get { slot: usize },
    /// Engine pointed at a descriptor for the first time.
    StartFresh { bda: u32 },
    /// Engine resumed after the descriptor at `bda`.
    Resume { bda: u32 },
    Stop { bda: u32 },
    Refused(Op, DmaError),
    PktDecrement { remaining: u32 },
    Packet { first: usize, buffers: usize },
    Irq(u32),
    Transfer { len: u32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    /// Number of consecutive times `payload` was recorded.
    pub count: u16,
    pub payload: Trace,
}

pub struct TraceBuf<const N: usize> {
    entries: Deque<TraceEntry, N>,
}

impl<const N: usize> TraceBuf<N> {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    #[cfg(not(feature = "trace-disabled"))]
    pub fn record(&mut self, payload: Trace) {
        if let Some(last) = self.entries.back_mut() {
            if last.payload == payload && last.count < u16::MAX {
                last.count += 1;
                return;
            }
        }
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // Can't fail, we just made room.
        let _ = self.entries.push_back(TraceEntry { count: 1, payload });
    }

    #[cfg(feature = "trace-disabled")]
    #[inline(always)]
    pub fn record(&mut self, _payload: Trace) {}

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> + '_ {
        self.entries.iter()
    }

    /// The most recent payload, if any.
    pub fn last(&self) -> Option<Trace> {
        self.entries.back().map(|e| e.payload)
    }
}

impl<const N: usize> Default for TraceBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(feature = "trace-disabled")))]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_counted_not_stored() {
        let mut t = TraceBuf::<4>::new();
        t.record(Trace::Put { slot: 0 });
        for _ in 0..3 {
            t.record(Trace::Refused(Op::Start, DmaError::SgNoData));
        }
        assert_eq!(t.iter().count(), 2);
        let e: heapless::Vec<TraceEntry, 4> = t.iter().copied().collect();
        assert_eq!(e[0].payload, Trace::Put { slot: 0 });
        assert_eq!(e[1].count, 3);
    }

    #[test]
    fn oldest_entries_fall_off() {
        let mut t = TraceBuf::<3>::new();
        for slot in 0..5 {
            t.record(Trace::Get { slot });
        }
        assert_eq!(t.iter().count(), 3);
        assert_eq!(
            t.iter().next().map(|e| e.payload),
            Some(Trace::Get { slot: 2 })
        );
        assert_eq!(t.last(), Some(Trace::Get { slot: 4 }));
    }
}
