// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A cooperative, interrupt-driven runtime core for deeply embedded
//! microcontrollers: a bitmask-indexed, priority-ordered event dispatcher
//! and a millisecond timer table built on top of it, both sized entirely
//! at compile time and sharing state with interrupt context through
//! nothing heavier than [`evm_cells::VolatileCell`].
//!
//! The crate has no allocator, no threads, and no dependency on an
//! operating system. Everything a board needs to supply is the
//! [`evm_hal::PlatformHooks`] trait: interrupt gating, low-power entry,
//! and a hook for one periodic hardware tick. A typical application
//! wires the pieces together once, in a single `static`:
//!
//! ```ignore
//! static HOOKS: BoardHooks = BoardHooks::new();
//! static EVENTS: EventMachine<'static, 16, BoardHooks> =
//!     EventMachine::new(&HOOKS, LowPowerMode::Lpm3);
//! static TICK_CONTROL: BoardTimerPeripheral = BoardTimerPeripheral::new();
//! static SYSTEM_TIMER: SystemTimer<
//!     'static,
//!     EventMachine<'static, 16, BoardHooks>,
//!     BoardHooks,
//!     5,  // MAX_USER_TIMERS + 1
//!     1,  // TICK_MS
//! > = SystemTimer::new_stop_mode(&EVENTS, &HOOKS, TICK_EVENT, &TICK_CONTROL);
//!
//! const TICK_EVENT: EventId = 0;
//!
//! fn main() -> ! {
//!     SYSTEM_TIMER.init(|| SYSTEM_TIMER.tick_handler());
//!     SYSTEM_TIMER.new_timer(500, TimerCallback::NoId(blink_led));
//!     EVENTS.run()
//! }
//! ```
//!
//! The hardware tick ISR itself calls only [`systimer::SystemTimer::on_hw_tick`];
//! every other interrupt calls [`event::EventMachine::set_from_isr`] for the
//! event it implements and, if it needs to arm a timer from interrupt
//! context, [`systimer::SystemTimer::new_timer_from_isr`].

#![no_std]

#[cfg(test)]
extern crate std;

pub mod diag;
pub mod event;
pub mod systimer;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{EventId, EventMachine, EventRegistry, Handler};
pub use evm_hal::LowPowerMode;
pub use systimer::{EventSink, SystemTimer, TaskId, TickControl, TimerCallback};

/// Fatal-precondition assertion used throughout this crate in place of
/// `debug_assert!`.
///
/// Precondition violations here (an out-of-range event id, a zero-tick
/// deadline reaching the update procedure) are bugs in the calling
/// application, not recoverable runtime conditions — see the error
/// taxonomy documented on [`event::EventMachine::register`] and
/// [`systimer::SystemTimer`]. By default this compiles to a real panic
/// in debug builds and is compiled out entirely when the crate is built
/// with the `no_debug_panics` feature: a release board image that has
/// already shipped past integration testing may prefer a smaller, silent
/// binary over a panicking one, accepting that a precondition violation
/// then corrupts state instead of halting.
#[macro_export]
macro_rules! evm_assert {
    ($cond:expr, $($arg:tt)*) => {
        #[cfg(not(feature = "no_debug_panics"))]
        {
            assert!($cond, $($arg)*);
        }
    };
}
