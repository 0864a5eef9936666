// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel configuration.

use crate::regs::Intr;

/// Which way data flows through a channel. This decides how packet
/// boundaries are found when reclaiming descriptors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Memory to device. Software marks packet ends in the control word.
    Send,
    /// Device to memory. The engine marks packet ends in the status word.
    Recv,
}

/// How long `sg_stop` is willing to wait for the engine to acknowledge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpinLimit {
    /// Poll until the engine acknowledges, however long that takes. On
    /// broken hardware this never returns.
    Forever,
    /// Give up with `StopTimeout` after this many polls.
    Polls(u32),
}

/// Interrupt-coalescing and interrupt-enable settings, applied to a stopped
/// channel with `DmaChannel::configure`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelConfig {
    /// Packets to collect before raising `PKT_THRESHOLD`; 0 disables.
    pub pkt_threshold: u8,
    /// Milliseconds to wait after a packet before raising `PKT_WAIT_BOUND`;
    /// must be below 1024, 0 disables.
    pub pkt_wait_bound: u16,
    pub interrupts: Intr,
}

impl ChannelConfig {
    /// One interrupt per packet, no wait bound, the usual scatter-gather
    /// interrupt set.
    pub const DEFAULT: Self = Self {
        pkt_threshold: 1,
        pkt_wait_bound: 0,
        interrupts: Intr::SG_DEFAULT,
    };
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
