// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Platform Hooks: the three primitives the runtime core requires of its
//! host and nothing more — interrupt gating, low-power entry, and
//! ISR-return wake. Everything below this trait (oscillator setup, pin
//! mappings, the concrete timer peripheral) is a board concern the core
//! never sees.

#![no_std]

/// A CPU state in which clocks and peripherals are gated to reduce
/// current draw, exited by an interrupt. The numeric encoding of each
/// mode (which bits in which control register) is entirely a
/// [`PlatformHooks`] implementation detail; the core only ever names a
/// mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LowPowerMode {
    Lpm0,
    Lpm1,
    Lpm2,
    Lpm3,
    Lpm4,
}

/// An opaque snapshot of whether interrupts were enabled at the moment
/// [`PlatformHooks::disable_interrupts`] was called, returned so it can
/// later be restored exactly rather than unconditionally re-enabled.
/// Nesting `disable_interrupts`/`restore_interrupt_state` pairs is safe
/// as long as they are strictly stack-ordered, the same discipline
/// `cortex_m::interrupt::free` relies on.
#[derive(Clone, Copy, Debug)]
pub struct InterruptState(bool);

impl InterruptState {
    /// Constructs a state token directly. Platform implementations use
    /// this to wrap whatever bit they read out of the real status
    /// register; nothing outside a `PlatformHooks` impl should need to
    /// build one from scratch.
    pub const fn new(interrupts_were_enabled: bool) -> Self {
        InterruptState(interrupts_were_enabled)
    }

    pub const fn interrupts_were_enabled(self) -> bool {
        self.0
    }
}

/// The host primitives the runtime core is built on.
///
/// Implementors own exactly one real or simulated CPU; every method here
/// is expected to be cheap and non-blocking except [`enter_low_power`],
/// whose entire purpose is to block until an interrupt fires.
pub trait PlatformHooks {
    /// Disables interrupts and returns a token recording whether they
    /// were enabled beforehand. Must be paired with
    /// [`restore_interrupt_state`] or [`enable_interrupts`].
    fn disable_interrupts(&self) -> InterruptState;

    /// Unconditionally enables interrupts.
    fn enable_interrupts(&self);

    /// Reads the current interrupt-enable state without changing it.
    fn interrupt_state(&self) -> InterruptState;

    /// Restores interrupts to the state recorded in `state`.
    fn restore_interrupt_state(&self, state: InterruptState);

    /// Atomically enables interrupts and halts the CPU in `mode`.
    /// Returns once an interrupt has fired and that ISR has requested a
    /// wake (or, equivalently, once any interrupt preempts the halt on
    /// platforms where every interrupt wakes the core).
    fn enter_low_power(&self, mode: LowPowerMode);

    /// Called from within an ISR to force the core to resume after the
    /// ISR returns instead of falling back asleep, even if it would
    /// otherwise re-enter `enter_low_power`.
    fn wake_on_isr_return(&self);
}

/// Runs `f` with interrupts disabled, restoring the prior state
/// afterwards — the indivisible-critical-section primitive every
/// component in this runtime is built on.
///
/// Grounded in the same shape as the architecture-level `atomic()`
/// helper used to bracket register read-modify-write sequences on this
/// family of targets: disable, run the closure, restore.
#[inline]
pub fn atomic<H: PlatformHooks, R>(hooks: &H, f: impl FnOnce() -> R) -> R {
    let state = hooks.disable_interrupts();
    let result = f();
    hooks.restore_interrupt_state(state);
    result
}
