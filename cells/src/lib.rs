// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interior-mutability cells for state shared between a single-threaded
//! main context and interrupt handlers, with no allocator and no mutex.
//!
//! `core::cell::Cell` already gives non-atomic interior mutability, but it
//! is not `Sync`, so it cannot sit inside a `static` that an interrupt
//! handler also touches. Every type here is a thin, `Sync` wrapper that
//! pushes the actual atomicity requirement onto the caller: nothing in
//! this crate disables interrupts or takes a lock. Whoever reads or
//! writes a cell from a context where a concurrent interrupt could also
//! touch it is responsible for bracketing the access appropriately.

#![no_std]

use core::cell::{Cell, UnsafeCell};

/// A cell performing a volatile read or write of a `Copy` value.
///
/// Unlike [`core::cell::Cell`], every access goes through
/// [`core::ptr::read_volatile`]/[`core::ptr::write_volatile`], so the
/// compiler may not reorder or elide accesses around it. This is the
/// property needed for a word that an interrupt handler writes and the
/// main loop polls (or vice versa) purely through volatile semantics,
/// such as a pending-event mask or a millisecond tick counter.
///
/// Volatile semantics alone do not provide atomicity for anything wider
/// than a single load/store, nor do they order accesses to *other*
/// memory around them; callers needing either must still gate the
/// access with interrupts disabled.
#[repr(transparent)]
pub struct VolatileCell<T> {
    value: UnsafeCell<T>,
}

// Safety: `VolatileCell` never hands out a reference into `value`; every
// access goes through a volatile read or write of a whole `T`, so there
// is no data race as long as `T` itself has no interior mutability that
// escapes this type.
unsafe impl<T> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Creates a new cell holding `value`.
    pub const fn new(value: T) -> Self {
        VolatileCell {
            value: UnsafeCell::new(value),
        }
    }

    /// Performs a volatile read of the current value.
    #[inline]
    pub fn get(&self) -> T {
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Performs a volatile write of `value`.
    #[inline]
    pub fn set(&self, value: T) {
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }
}

/// An `Option<T>`-shaped cell for a value that may not have been
/// installed yet: a fail-hook, a diagnostics sink, anything with a
/// natural "not set" state that isn't simply a default value of `T`.
///
/// `OptionalCell` is built on `core::cell::Cell`, not [`VolatileCell`]:
/// it is meant for state that only the main context ever writes (for
/// example, installing a fail hook at start-up), read from contexts
/// where the caller already knows no concurrent writer can race it.
/// Component documentation on each user of `OptionalCell` spells out
/// which context may call `set`.
pub struct OptionalCell<T> {
    value: Cell<Option<T>>,
}

// Safety: sound on the single-core, non-reentrant targets this crate is
// for. There is never more than one flow of control alive at a time —
// an interrupt preempts the main context rather than running alongside
// it — so a `&OptionalCell` reachable from both is never actually
// accessed concurrently, only accessed from contexts that take turns.
// Components built on this cell still document which context may call
// `set`, since preemption can still interleave a read and a write.
unsafe impl<T> Sync for OptionalCell<T> {}

impl<T> OptionalCell<T> {
    /// Creates an empty cell.
    pub const fn empty() -> Self {
        OptionalCell {
            value: Cell::new(None),
        }
    }

    /// Creates a cell already holding `value`.
    pub const fn new(value: T) -> Self {
        OptionalCell {
            value: Cell::new(Some(value)),
        }
    }

    /// Installs `value`, discarding whatever was there before.
    pub fn set(&self, value: T) {
        self.value.set(Some(value));
    }

    /// Empties the cell.
    pub fn clear(&self) {
        self.value.set(None);
    }

    /// Returns `true` if the cell currently holds a value.
    pub fn is_some(&self) -> bool {
        // SAFETY-free: Cell::take/Cell::set round-trip without ever
        // exposing a reference, so peeking like this needs `T: Copy`
        // only when callers want the value itself, not its presence.
        let inner = self.value.take();
        let present = inner.is_some();
        self.value.set(inner);
        present
    }
}

impl<T: Copy> OptionalCell<T> {
    /// Returns the held value, or `default` if the cell is empty.
    pub fn unwrap_or(&self, default: T) -> T {
        self.value.get().unwrap_or(default)
    }

    /// Calls `f` with the held value and returns its result, or returns
    /// `None` if the cell is empty.
    pub fn map<R>(&self, f: impl FnOnce(T) -> R) -> Option<R> {
        self.value.get().map(f)
    }
}
