// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The System Timer: a fixed-size table of millisecond countdowns built
//! on top of a single periodic hardware tick, posting one low-priority
//! event whenever any slot expires.
//!
//! The table itself never runs a callback directly from interrupt
//! context. The hardware tick ISR only advances a counter and decides
//! whether to post the tick event; every slot update and every
//! callback invocation happens later, back in main context, when the
//! Event Machine dispatches that event.

use evm_cells::VolatileCell;
use evm_hal::PlatformHooks;

use crate::event::{EventId, EventMachine, Handler};
use crate::evm_assert;

/// An application-chosen tag distinguishing one periodic task's
/// callback invocations from another's, threaded back through
/// [`TimerCallback::WithId`].
pub type TaskId = i32;

/// The callback stored in a timer slot.
///
/// This is a tagged union rather than the `(fn(TaskId, u16), TaskId)`
/// pair with a sentinel id that a C table of this shape would use: a
/// bare `fn()` cannot carry a meaningless id, and there is no spare
/// `TaskId` value that is safe to reserve as "no id" without also
/// forbidding an application from legitimately using it. Variants:
///
/// - [`NoId`](TimerCallback::NoId): a one-shot or periodic callback
///   that takes no arguments, for timers an application never needs to
///   distinguish from one another at the call site.
/// - [`WithId`](TimerCallback::WithId): a callback shared by a family
///   of tasks, invoked with the id that was registered alongside it
///   and the latency (in milliseconds) by which this firing overran
///   its nominal deadline. Returning `0` stops the task; any other
///   value reschedules it for that many milliseconds from now.
#[derive(Clone, Copy)]
pub enum TimerCallback {
    NoId(fn()),
    WithId(fn(TaskId, u16) -> u16, TaskId),
}

impl PartialEq for TimerCallback {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TimerCallback::NoId(a), TimerCallback::NoId(b)) => *a as usize == *b as usize,
            (TimerCallback::WithId(a, ida), TimerCallback::WithId(b, idb)) => {
                *a as usize == *b as usize && ida == idb
            }
            _ => false,
        }
    }
}

fn no_op() {}

const NO_OP: TimerCallback = TimerCallback::NoId(no_op);

/// `timer_lock`'s unlocked value. A plain sentinel integer rather than
/// `Option<usize>`: `Option<usize>` has no spare niche to exploit (every
/// bit pattern of a `usize` is a legitimate payload), so it is wider
/// than one machine word and a read/write of it is not the single
/// indivisible operation the slot-lock protocol requires — an ISR
/// preempting mid-write could observe a torn discriminant/payload pair.
/// `i32` with `-1` meaning "unlocked" mirrors the original `static
/// volatile int timer_lock = -1;` and fits in one word on every target
/// this runtime runs on.
const NO_LOCK: i32 = -1;

/// One slot in the table: a countdown in milliseconds (`0` means free)
/// and the callback to run when it reaches zero.
///
/// `counter` lives in the same reference frame as `sys_tick`/`next_tick`,
/// not as a countdown from the moment it was last written: arming or
/// renewing a slot while `sys_tick` is already nonzero (time has passed
/// since the last tick-handler pass but no expiry has happened yet)
/// stores `timeout_ms + sys_tick`, the absolute deadline, rather than
/// the bare `timeout_ms`. The next tick-handler pass subtracts one
/// shared `tick_count` from every active slot, so every slot's counter
/// has to be expressed against that same shared baseline for the
/// subtraction to land on the right deadline; storing a bare
/// `timeout_ms` would make a timer renewed mid-interval expire too
/// early by however much `sys_tick` had already accumulated.
struct TimerSlot {
    counter: VolatileCell<u16>,
    call: VolatileCell<TimerCallback>,
}

impl TimerSlot {
    const fn empty() -> Self {
        TimerSlot {
            counter: VolatileCell::new(0),
            call: VolatileCell::new(NO_OP),
        }
    }
}

/// Lets the System Timer post its tick event, and register its own tick
/// handler, without depending on the concrete [`EventMachine`] type
/// parameters, and without the reciprocal dependency that would result
/// if `EventMachine` instead depended on `SystemTimer`.
pub trait EventSink {
    fn set_from_isr(&self, id: EventId);
    fn clear(&self, id: EventId);
    fn register(&self, id: EventId, handler: Option<Handler>);
}

impl<'h, const N: usize, H: PlatformHooks> EventSink for EventMachine<'h, N, H> {
    fn set_from_isr(&self, id: EventId) {
        EventMachine::set_from_isr(self, id)
    }

    fn clear(&self, id: EventId) {
        EventMachine::clear(self, id)
    }

    fn register(&self, id: EventId, handler: Option<Handler>) {
        EventMachine::register(self, id, handler)
    }
}

/// Gates the real hardware tick source on and off, so it need only run
/// while at least one timer is active. Boards that would rather leave
/// the tick free-running simply aren't given one: see
/// [`SystemTimer::new_continuous`] vs. [`SystemTimer::new_stop_mode`].
pub trait TickControl {
    fn start(&self);
    fn stop(&self);
}

/// A fixed-size table of countdowns driven by one periodic hardware
/// tick, virtualized across up to `SLOTS` simultaneous timers.
///
/// `SLOTS` is a plain const generic, not `MAX_USER_TIMERS + 1`
/// computed here, because `generic_const_exprs` is not stable; callers
/// size their table by passing the already-added total directly (one
/// extra slot beyond their own concurrent-timer budget, reserved so an
/// ISR always has a slot to claim even while the main loop is mutating
/// the table — see [`new_timer`](SystemTimer::new_timer_from_isr)).
///
/// `TICK_MS` is the real duration of one hardware tick; every duration
/// the public API accepts is in milliseconds and converted internally
/// by counting ticks, so `TICK_MS` need not be `1` (the original
/// hardware this table's scheme was modeled on always ran it at `1`,
/// but nothing here requires that).
pub struct SystemTimer<'e, E: EventSink, H: PlatformHooks, const SLOTS: usize, const TICK_MS: u16> {
    events: &'e E,
    hooks: &'e H,
    tick_event: EventId,
    tick_control: Option<&'e dyn TickControl>,
    table: [TimerSlot; SLOTS],
    timer_lock: VolatileCell<i32>,
    fail_callback: VolatileCell<fn()>,
    sys_tick: VolatileCell<u16>,
    next_tick: VolatileCell<u16>,
}

impl<'e, E: EventSink, H: PlatformHooks, const SLOTS: usize, const TICK_MS: u16>
    SystemTimer<'e, E, H, SLOTS, TICK_MS>
{
    /// Builds a table that leaves its hardware tick free-running. Use
    /// this when the board has nowhere cheaper to be while idle than
    /// its normal low-power mode with the tick still ticking, or when
    /// [`TickControl`] isn't implemented for the timer peripheral.
    ///
    /// `hooks` is the same [`PlatformHooks`] implementor the owning
    /// `EventMachine` was built with — typically passed as
    /// `events.hooks()` — so the table's own critical sections gate
    /// the identical interrupt source the rest of the runtime does.
    pub const fn new_continuous(events: &'e E, hooks: &'e H, tick_event: EventId) -> Self {
        Self::new_impl(events, hooks, tick_event, None)
    }

    /// Builds a table that starts its hardware tick only once the
    /// first timer is armed and stops it once the table empties again,
    /// via `control`.
    pub const fn new_stop_mode(
        events: &'e E,
        hooks: &'e H,
        tick_event: EventId,
        control: &'e dyn TickControl,
    ) -> Self {
        Self::new_impl(events, hooks, tick_event, Some(control))
    }

    const fn new_impl(
        events: &'e E,
        hooks: &'e H,
        tick_event: EventId,
        tick_control: Option<&'e dyn TickControl>,
    ) -> Self {
        assert!(SLOTS > 0, "a timer table needs at least one slot");
        assert!(TICK_MS > 0, "a zero-length tick can never elapse");
        SystemTimer {
            events,
            hooks,
            tick_event,
            tick_control,
            table: [const { TimerSlot::empty() }; SLOTS],
            timer_lock: VolatileCell::new(NO_LOCK),
            fail_callback: VolatileCell::new(no_op),
            sys_tick: VolatileCell::new(0),
            next_tick: VolatileCell::new(0),
        }
    }

    /// Registers `tick_trampoline` as the handler for this table's tick
    /// event with the owning `EventMachine`, the Rust rendition of the
    /// source's `systimer_init()`: the System Timer's contract is to
    /// wire its own tick handler into the Event Registry, not to leave
    /// that wiring as an exercise for application start-up code.
    ///
    /// Configuring the hardware tick peripheral itself (the other half
    /// of `systimer_init`'s contract) is not this call's job: the
    /// concrete timer register interface is out of scope for this core
    /// (see the crate root's module doc), and what little the core does
    /// own — whether the tick is free-running or gated — is already
    /// decided at construction time via [`new_continuous`](Self::new_continuous)
    /// vs. [`new_stop_mode`](Self::new_stop_mode) and driven by
    /// [`TickControl::start`]/[`TickControl::stop`] as timers come and
    /// go, not by `init` itself.
    ///
    /// `tick_trampoline` must be a zero-capture function that calls back
    /// into `self.tick_handler()` — a bare `fn()` handler cannot itself
    /// carry `self`, so the caller supplies the trampoline closure over
    /// the `static` holding this table:
    ///
    /// ```ignore
    /// SYSTEM_TIMER.init(|| SYSTEM_TIMER.tick_handler());
    /// ```
    pub fn init(&self, tick_trampoline: Handler) {
        self.events.register(self.tick_event, Some(tick_trampoline));
    }

    /// Installs the hook invoked in place of arming a timer whenever
    /// every slot is occupied. `None` restores the default no-op;
    /// callers that want exhaustion to be audible (a diagnostic log
    /// line, a panic in a debug build) install their own.
    pub fn register_fail_callback(&self, callback: Option<fn()>) {
        self.fail_callback.set(callback.unwrap_or(no_op));
    }

    /// The handler registered with the owning `EventMachine` by
    /// [`init`](Self::init) for this table's tick event. Not called
    /// directly by application code.
    pub fn tick_handler(&self) {
        let mut tick = self.sys_tick.get();
        loop {
            self.sys_tick.set(self.sys_tick.get().wrapping_sub(tick));
            self.update_tick(tick);
            self.events.clear(self.tick_event);
            tick = self.next_tick.get();
            if !(tick != 0 && self.sys_tick.get() >= tick) {
                break;
            }
        }
    }

    /// Called directly from the real hardware tick ISR. Only ever
    /// touches the raw tick counters; every slot mutation and every
    /// callback happens later in [`tick_handler`](Self::tick_handler).
    pub fn on_hw_tick(&self) {
        if self.tick_control.is_none() && self.next_tick.get() == 0 {
            // Free-running tick, nothing armed: nothing to do.
            return;
        }
        let sys_tick = self.sys_tick.get().wrapping_add(TICK_MS);
        self.sys_tick.set(sys_tick);
        if sys_tick >= self.next_tick.get() {
            self.events.set_from_isr(self.tick_event);
        }
    }

    /// Arms a one-shot or periodic timer from main context. `timeout_ms
    /// == 0` is treated as "nothing to schedule" and trivially
    /// succeeds. Returns `false`, having invoked the fail callback,
    /// if every slot is occupied.
    pub fn new_timer(&self, timeout_ms: u16, callback: TimerCallback) -> bool {
        self.new_impl(timeout_ms, callback)
    }

    /// Identical to [`new_timer`](Self::new_timer); the distinct name
    /// documents that this call is safe from within an ISR (the
    /// critical sections inside `new_impl` nest safely with interrupts
    /// already disabled, since they save and restore the prior state
    /// rather than force interrupts on).
    pub fn new_timer_from_isr(&self, timeout_ms: u16, callback: TimerCallback) -> bool {
        self.new_impl(timeout_ms, callback)
    }

    fn new_impl(&self, timeout_ms: u16, callback: TimerCallback) -> bool {
        if timeout_ms == 0 {
            return true;
        }
        for i in 0..SLOTS {
            if self.timer_lock.get() == i as i32 {
                continue;
            }
            self.timer_lock.set(i as i32);
            if self.table[i].counter.get() == 0 {
                let deadline = timeout_ms.wrapping_add(self.sys_tick.get());
                self.table[i].counter.set(deadline);
                self.table[i].call.set(callback);
                self.timer_lock.set(NO_LOCK);
                self.update_next_tick(deadline);
                return true;
            }
        }
        self.timer_lock.set(NO_LOCK);
        self.fail_callback.get()();
        false
    }

    /// Re-arms whichever slot currently holds `callback`, or arms a
    /// new one if none does. `timeout_ms == 0` cancels the match
    /// without rescheduling it. Not safe to call from an ISR: unlike
    /// [`new_timer_from_isr`](Self::new_timer_from_isr), the scan for a
    /// matching slot is not itself lock-protected, only the mutation
    /// once a match is found.
    pub fn renew(&self, timeout_ms: u16, callback: TimerCallback) -> bool {
        for i in 0..SLOTS {
            if self.table[i].counter.get() != 0 && self.table[i].call.get() == callback {
                self.timer_lock.set(i as i32);
                if timeout_ms != 0 {
                    let deadline = timeout_ms.wrapping_add(self.sys_tick.get());
                    self.table[i].counter.set(deadline);
                    self.timer_lock.set(NO_LOCK);
                    self.update_next_tick(deadline);
                } else {
                    self.table[i].counter.set(0);
                    self.timer_lock.set(NO_LOCK);
                }
                return true;
            }
        }
        if timeout_ms != 0 {
            self.new_impl(timeout_ms, callback)
        } else {
            true
        }
    }

    /// Cancels whichever slot currently holds `callback`, if any.
    pub fn delete(&self, callback: TimerCallback) {
        for i in 0..SLOTS {
            if self.table[i].call.get() == callback {
                self.timer_lock.set(i as i32);
                self.table[i].counter.set(0);
                self.timer_lock.set(NO_LOCK);
                return;
            }
        }
    }

    fn update_next_tick(&self, current_tick: u16) {
        evm_assert!(current_tick != 0, "cannot schedule a zero-tick deadline");
        evm_hal::atomic(self.hooks, || {
            let next = self.next_tick.get();
            if current_tick < next {
                self.next_tick.set(current_tick);
            } else if next == 0 {
                self.next_tick.set(current_tick);
                if let Some(control) = self.tick_control {
                    control.start();
                }
            }
        });
    }

    fn update_tick(&self, tick_count: u16) {
        let mut min_tick = u16::MAX;
        self.next_tick.set(u16::MAX);

        for i in 0..SLOTS {
            self.timer_lock.set(i as i32);
            let mut counter = self.table[i].counter.get();
            if counter != 0 {
                counter = counter.wrapping_sub(tick_count);
                if (counter as i16) <= 0 {
                    counter = match self.table[i].call.get() {
                        TimerCallback::NoId(cb) => {
                            cb();
                            0
                        }
                        TimerCallback::WithId(cb, id) => {
                            let latency = counter.wrapping_neg();
                            cb(id, latency)
                        }
                    };
                    self.table[i].counter.set(counter);
                } else {
                    self.table[i].counter.set(counter);
                }
                if counter != 0 && counter < min_tick {
                    min_tick = counter;
                }
            }
        }
        self.timer_lock.set(NO_LOCK);

        if min_tick == u16::MAX && self.next_tick.get() == u16::MAX {
            evm_hal::atomic(self.hooks, || {
                if self.next_tick.get() == u16::MAX {
                    self.next_tick.set(0);
                    self.sys_tick.set(0);
                    if let Some(control) = self.tick_control {
                        control.stop();
                    }
                }
            });
        } else {
            self.update_next_tick(min_tick);
        }
    }
}
