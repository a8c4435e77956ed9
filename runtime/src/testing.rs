// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-runnable test doubles for the Platform Hooks trait and this
//! runtime's own internal collaborator traits.
//!
//! None of these simulate real concurrency — tests run single-threaded,
//! so there is never an actual race between "main context" and "ISR"
//! code. What they do simulate is the *sequencing*: a test plays the
//! part of an ISR by calling `*_from_isr` methods directly, interleaved
//! with main-context calls, exactly as a real ISR would preempt between
//! two instructions: a fake backing clock driven by explicit calls from
//! the test, plumbed through the exact generic code path a real board
//! uses.

use core::cell::Cell;

use evm_hal::{InterruptState, LowPowerMode, PlatformHooks};

use crate::event::{EventId, Handler};
use crate::systimer::{EventSink, TickControl};

/// A [`PlatformHooks`] double with no real interrupts or hardware sleep.
/// Interrupt gating is tracked as a plain `bool` counter of nesting
/// depth; "sleeping" just counts how many times [`enter_low_power`] was
/// called, since there's no hardware to actually halt.
pub struct MockHooks {
    interrupts_enabled: Cell<bool>,
    wake_requests: Cell<u32>,
    sleeps: Cell<u32>,
    last_mode: Cell<Option<LowPowerMode>>,
}

impl MockHooks {
    pub const fn new() -> Self {
        MockHooks {
            interrupts_enabled: Cell::new(true),
            wake_requests: Cell::new(0),
            sleeps: Cell::new(0),
            last_mode: Cell::new(None),
        }
    }

    /// Number of times `wake_on_isr_return` has been called.
    pub fn wake_requests(&self) -> u32 {
        self.wake_requests.get()
    }

    /// Number of times `enter_low_power` has been called.
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.get()
    }

    /// The mode passed to the most recent `enter_low_power` call.
    pub fn last_mode(&self) -> Option<LowPowerMode> {
        self.last_mode.get()
    }
}

impl Default for MockHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformHooks for MockHooks {
    fn disable_interrupts(&self) -> InterruptState {
        let previous = self.interrupts_enabled.get();
        self.interrupts_enabled.set(false);
        InterruptState::new(previous)
    }

    fn enable_interrupts(&self) {
        self.interrupts_enabled.set(true);
    }

    fn interrupt_state(&self) -> InterruptState {
        InterruptState::new(self.interrupts_enabled.get())
    }

    fn restore_interrupt_state(&self, state: InterruptState) {
        self.interrupts_enabled.set(state.interrupts_were_enabled());
    }

    fn enter_low_power(&self, mode: LowPowerMode) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.last_mode.set(Some(mode));
        // Real hardware re-enables interrupts atomically with halting.
        self.interrupts_enabled.set(true);
    }

    fn wake_on_isr_return(&self) {
        self.wake_requests.set(self.wake_requests.get() + 1);
    }
}

/// An [`EventSink`] double recording which events were set or cleared,
/// standing in for an `EventMachine` in tests that exercise
/// [`crate::systimer::SystemTimer`] in isolation.
pub struct MockEvents {
    set_count: Cell<u32>,
    clear_count: Cell<u32>,
    last_set: Cell<Option<EventId>>,
    registered: Cell<Option<(EventId, Option<Handler>)>>,
}

impl MockEvents {
    pub fn new() -> Self {
        MockEvents {
            set_count: Cell::new(0),
            clear_count: Cell::new(0),
            last_set: Cell::new(None),
            registered: Cell::new(None),
        }
    }

    pub fn set_count(&self) -> u32 {
        self.set_count.get()
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count.get()
    }

    pub fn last_set(&self) -> Option<EventId> {
        self.last_set.get()
    }

    /// The `(id, handler)` pair most recently passed to `register`, if
    /// any — lets a test confirm `SystemTimer::init` actually wired its
    /// tick handler into the registry rather than merely constructed it.
    pub fn registered(&self) -> Option<(EventId, Option<Handler>)> {
        self.registered.get()
    }
}

impl Default for MockEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MockEvents {
    fn set_from_isr(&self, id: EventId) {
        self.set_count.set(self.set_count.get() + 1);
        self.last_set.set(Some(id));
    }

    fn clear(&self, id: EventId) {
        let _ = id;
        self.clear_count.set(self.clear_count.get() + 1);
    }

    fn register(&self, id: EventId, handler: Option<Handler>) {
        self.registered.set(Some((id, handler)));
    }
}

/// A [`TickControl`] double recording whether the simulated hardware
/// tick is currently running.
pub struct MockTickControl {
    running: Cell<bool>,
    start_count: Cell<u32>,
    stop_count: Cell<u32>,
}

impl MockTickControl {
    pub fn new() -> Self {
        MockTickControl {
            running: Cell::new(false),
            start_count: Cell::new(0),
            stop_count: Cell::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn start_count(&self) -> u32 {
        self.start_count.get()
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.get()
    }
}

impl Default for MockTickControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TickControl for MockTickControl {
    fn start(&self) {
        self.running.set(true);
        self.start_count.set(self.start_count.get() + 1);
    }

    fn stop(&self) {
        self.running.set(false);
        self.stop_count.set(self.stop_count.get() + 1);
    }
}
