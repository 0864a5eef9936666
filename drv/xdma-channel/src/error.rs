// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status codes returned by channel operations.

use num_derive::FromPrimitive;

/// Everything a channel operation can refuse to do.
///
/// The discriminants are the numeric status codes used by the rest of the
/// Xilinx driver family, so a code can travel through a `u32` status word
/// (`u32::from(err)`) and come back out with `DmaError::from_u32`.
///
/// None of these indicate that hardware state was changed; callers decide for
/// themselves whether to retry, ignore, or reset the channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum DmaError {
    /// Generic failure with no more specific code.
    Failure = 1,
    /// An argument was out of the range the hardware accepts.
    InvalidParam = 15,
    /// A simple DMA transfer is still in flight.
    DeviceBusy = 21,
    /// The engine reported an error during a simple DMA transfer.
    TransferError = 511,
    /// After reset, a register did not read back its reset value.
    ResetRegisterError = 512,
    /// The descriptor ring holds no active descriptors.
    SgListEmpty = 513,
    /// Scatter-gather processing is already running.
    SgIsStarted = 514,
    /// Scatter-gather processing is already stopped.
    SgIsStopped = 515,
    /// Every slot in the ring is holding an active descriptor.
    SgListFull = 517,
    /// The slot that would be overwritten has its software lock set.
    SgBdLocked = 518,
    /// No puts are waiting to be committed.
    SgNothingToCommit = 519,
    /// A descriptor ring has already been created for this channel.
    SgListExists = 521,
    /// No descriptor ring has been created for this channel yet.
    SgNoList = 522,
    /// The engine would resume into descriptors that are not committed.
    SgBdNotCommitted = 523,
    /// The engine would resume into a descriptor it has already processed.
    SgNoData = 524,
    /// The engine never acknowledged a stop request within the poll limit.
    StopTimeout = 525,
}

impl DmaError {
    /// Recovers an error from its numeric status code.
    pub fn from_u32(code: u32) -> Option<Self> {
        num_traits::FromPrimitive::from_u32(code)
    }

    /// Start refusals that only mean "the engine is already doing, or has
    /// already done, what you asked". Submission paths routinely ignore
    /// these.
    pub fn is_benign(self) -> bool {
        matches!(
            self,
            Self::SgIsStarted | Self::SgNoData | Self::SgBdNotCommitted
        )
    }
}

impl From<DmaError> for u32 {
    fn from(e: DmaError) -> Self {
        e as u32
    }
}
