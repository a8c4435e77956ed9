// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The Event Registry and Event Machine: a bitmask-indexed,
//! priority-ordered dispatcher of zero-argument handlers, and the
//! sleep-when-idle loop built on top of it.

use evm_cells::VolatileCell;
use evm_hal::{LowPowerMode, PlatformHooks};

use crate::evm_assert;

/// An event identifier: a slot in `[0, N)`. Lower ids dispatch first
/// within a pass.
pub type EventId = usize;

/// A short, non-blocking, zero-argument handler.
pub type Handler = fn();

fn no_op_handler() {}

/// Owns the fixed-size table mapping an event id to its handler.
///
/// Every slot defaults to the no-op handler, so the dispatch loop never
/// needs to branch on "is something installed here?" — it is always
/// safe to call `handlers[i]()` for any `i` the mask names.
pub struct EventRegistry<const N: usize> {
    handlers: [VolatileCell<Handler>; N],
}

impl<const N: usize> EventRegistry<N> {
    pub const fn new() -> Self {
        EventRegistry {
            handlers: [const { VolatileCell::new(no_op_handler as Handler) }; N],
        }
    }

    /// Installs `handler` as the callback for event `id`. `None`
    /// installs the no-op, equivalent to unregistering.
    ///
    /// # Panics
    /// Panics if `id >= N`: this is a precondition violation, not a
    /// recoverable error (see the error handling notes on
    /// [`EventMachine::register`]).
    pub fn register(&self, id: EventId, handler: Option<Handler>) {
        evm_assert!(id < N, "event id {} out of range (N = {})", id, N);
        self.handlers[id].set(handler.unwrap_or(no_op_handler));
    }

    #[inline]
    fn dispatch(&self, id: EventId) {
        self.handlers[id].get()();
    }
}

impl<const N: usize> Default for EventRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The dispatch loop: owns the pending-events bitmask and the low-power
/// mode to enter once it is empty.
///
/// `N` must not exceed 32, the width of the mask word; violating this
/// is a precondition failure caught at construction.
pub struct EventMachine<'h, const N: usize, H: PlatformHooks> {
    hooks: &'h H,
    registry: EventRegistry<N>,
    mask: VolatileCell<u32>,
    lpm: VolatileCell<LowPowerMode>,
}

/// Bits `[0, N)`; any bit outside this range observed in the mask is a
/// stray write and is defensively cleared.
const fn used_bits(n: usize) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

impl<'h, const N: usize, H: PlatformHooks> EventMachine<'h, N, H> {
    /// Creates a new machine. `mode` is the low-power mode entered the
    /// first time the mask is observed empty, before any call to
    /// [`set_low_power_mode`](Self::set_low_power_mode).
    pub const fn new(hooks: &'h H, mode: LowPowerMode) -> Self {
        assert!(N <= 32, "event count exceeds mask word width");
        EventMachine {
            hooks,
            registry: EventRegistry::new(),
            mask: VolatileCell::new(0),
            lpm: VolatileCell::new(mode),
        }
    }

    /// Installs `handler` as the callback for event `id`. `None`
    /// installs the no-op, equivalent to unregistering.
    pub fn register(&self, id: EventId, handler: Option<Handler>) {
        self.registry.register(id, handler);
    }

    /// The interrupt-gating primitive this machine dispatches on top of.
    /// Exposed so collaborators that must bracket their own critical
    /// sections (the System Timer's table updates, chiefly) don't need
    /// a separate handle to the same [`PlatformHooks`] implementor.
    pub fn hooks(&self) -> &'h H {
        self.hooks
    }

    /// Returns whether event `id` is currently pending.
    pub fn is_pending(&self, id: EventId) -> bool {
        evm_assert!(id < N, "event id {} out of range (N = {})", id, N);
        self.mask.get() & (1 << id) != 0
    }

    /// Clears event `id` without dispatching it.
    pub fn clear(&self, id: EventId) {
        evm_assert!(id < N, "event id {} out of range (N = {})", id, N);
        let state = self.hooks.disable_interrupts();
        self.mask.set(self.mask.get() & !(1 << id));
        self.hooks.restore_interrupt_state(state);
    }

    /// Sets event `id` pending. Call only from main context; for
    /// interrupt context use [`set_from_isr`](Self::set_from_isr).
    pub fn set(&self, id: EventId) {
        evm_assert!(id < N, "event id {} out of range (N = {})", id, N);
        let state = self.hooks.disable_interrupts();
        self.mask.set(self.mask.get() | (1 << id));
        self.hooks.restore_interrupt_state(state);
    }

    /// The ISR-safe variant of [`set`](Self::set): also requests
    /// [`PlatformHooks::wake_on_isr_return`] so a sleeping CPU resumes
    /// as soon as this ISR returns. Assumes interrupts are already
    /// disabled, as they are inside any ISR.
    pub fn set_from_isr(&self, id: EventId) {
        evm_assert!(id < N, "event id {} out of range (N = {})", id, N);
        self.mask.set(self.mask.get() | (1 << id));
        self.hooks.wake_on_isr_return();
    }

    /// Stores the mode used the next time the machine falls asleep.
    pub fn set_low_power_mode(&self, mode: LowPowerMode) {
        self.lpm.set(mode);
    }

    /// As [`set_low_power_mode`](Self::set_low_power_mode), but also
    /// forces a wake so an already-sleeping CPU notices the new mode
    /// and re-enters sleep in it rather than waiting for the next
    /// unrelated interrupt.
    pub fn set_low_power_mode_from_isr(&self, mode: LowPowerMode) {
        self.lpm.set(mode);
        self.hooks.wake_on_isr_return();
    }

    /// Runs one dispatch pass over `[0, N)` in ascending order,
    /// dispatching every pending handler and clearing its bit first. A
    /// pass ends when the mask empties or the cursor reaches `N`; it
    /// does not restart mid-pass just because a new, higher-priority
    /// bit was set by the handler it's currently running — only
    /// [`run`](Self::run) restarts a pass, and only between passes.
    fn dispatch_pass(&self) {
        let mut current = self.mask.get();
        for id in 0..N {
            let bit = 1u32 << id;
            if current & bit == 0 {
                continue;
            }
            let state = self.hooks.disable_interrupts();
            self.mask.set(self.mask.get() & !bit);
            self.hooks.restore_interrupt_state(state);

            self.registry.dispatch(id);

            current = self.mask.get();
            if current == 0 {
                return;
            }
        }

        let stray = self.mask.get() & !used_bits(N);
        evm_assert!(stray == 0, "stray event bits set: {:#x}", stray);
        if stray != 0 {
            self.mask.set(self.mask.get() & used_bits(N));
        }
    }

    /// Transfers control to the dispatch loop. Never returns.
    ///
    /// Once a pass ends with nothing pending, the machine disables
    /// interrupts, re-checks the mask (closing the race against an ISR
    /// that set a bit between the last check and here), and either
    /// loops back to start a pass or sleeps.
    pub fn run(&self) -> ! {
        loop {
            while self.mask.get() != 0 {
                self.dispatch_pass();
            }

            let state = self.hooks.disable_interrupts();
            if self.mask.get() != 0 {
                // An ISR posted between the empty check above and here;
                // don't sleep, go dispatch it.
                self.hooks.restore_interrupt_state(state);
                continue;
            }
            // `enter_low_power` re-enables interrupts atomically with
            // halting, per Platform Hooks contract, so there is no
            // window where an ISR can't wake us.
            self.hooks.enter_low_power(self.lpm.get());
            self.hooks.restore_interrupt_state(state);
        }
    }
}
