// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutual exclusion between task context and interrupt context.
//!
//! Ring operations are plain `&mut self` calls and take no locks. If the same
//! channel is driven both from an interrupt handler and from the main loop,
//! the caller has to keep the two from interleaving, usually by masking the
//! device's interrupt around each put/commit/start sequence. This trait is
//! how the caller hands that masking to the helpers in this crate.

/// A way to run a closure with the channel's interrupt source masked.
pub trait InterruptGate {
    fn with_masked<R>(&self, body: impl FnOnce() -> R) -> R;
}

/// Gate built on the `critical-section` crate, for platforms that provide an
/// implementation (disable-all-interrupts on a single core, for instance).
#[derive(Copy, Clone, Debug, Default)]
pub struct CriticalSectionGate;

impl InterruptGate for CriticalSectionGate {
    fn with_masked<R>(&self, body: impl FnOnce() -> R) -> R {
        critical_section::with(|_cs| body())
    }
}

/// Gate that does nothing, for channels that are only ever touched from one
/// context (polled mode).
#[derive(Copy, Clone, Debug, Default)]
pub struct Unmasked;

impl InterruptGate for Unmasked {
    fn with_masked<R>(&self, body: impl FnOnce() -> R) -> R {
        body()
    }
}
