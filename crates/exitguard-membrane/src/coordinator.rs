//! Shared record of termination requests.
//!
//! The coordinator holds three atomics: the first requested exit code
//! (write-once-wins per cycle), the number of requests seen, and whether a
//! cycle is armed. Requests, snapshots and resets never take a lock. The
//! only lock serializes whole cycles so two tests sharing one coordinator
//! never observe each other's codes.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};

use crate::signal::TerminationSignal;

/// Sentinel for "no request recorded". Outside the `i32` range.
const UNSET: i64 = i64::MIN;

/// Process-safe exit-capture state.
#[derive(Debug)]
pub struct ExitCoordinator {
    first_code: AtomicI64,
    requests: AtomicU64,
    armed: AtomicBool,
    cycle: Mutex<()>,
    cycle_owner: Mutex<Option<ThreadId>>,
}

impl Default for ExitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitCoordinator {
    /// A coordinator with no recorded request and no armed cycle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            first_code: AtomicI64::new(UNSET),
            requests: AtomicU64::new(0),
            armed: AtomicBool::new(false),
            cycle: Mutex::new(()),
            cycle_owner: Mutex::new(None),
        }
    }

    /// Record `code` and unwind the calling thread with a
    /// [`TerminationSignal`]. Only the first request in a cycle sets the
    /// recorded code; every request unwinds.
    ///
    /// The unwind ends at the nearest lifecycle or assertion boundary on this
    /// thread. On a spawned thread with no boundary it ends that thread only;
    /// the signal becomes the thread's join error.
    pub fn request_termination(&self, code: i32) -> ! {
        self.record(code);
        TerminationSignal::new(code).raise()
    }

    /// Record a request without unwinding. Returns true if this request won
    /// the race for the first code.
    pub fn record(&self, code: i32) -> bool {
        self.requests.fetch_add(1, Ordering::AcqRel);
        self.first_code
            .compare_exchange(UNSET, i64::from(code), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// First code recorded since the last reset.
    #[must_use]
    pub fn first_code(&self) -> Option<i32> {
        match self.first_code.load(Ordering::Acquire) {
            UNSET => None,
            // Only `i32` values are ever stored.
            v => i32::try_from(v).ok(),
        }
    }

    /// Requests recorded since the last reset, including ones that lost the
    /// race.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    /// True while a [`CycleGuard`] is alive.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Clear the recorded code and request count.
    pub fn reset(&self) {
        self.first_code.store(UNSET, Ordering::Release);
        self.requests.store(0, Ordering::Release);
    }

    /// Start a cycle: wait for any other cycle on this coordinator to end,
    /// reset, and arm. The guard disarms and resets when dropped, including
    /// during unwinding.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds a cycle on this
    /// coordinator. Cycles do not nest.
    pub fn begin_cycle(&self) -> CycleGuard<'_> {
        let me = thread::current().id();
        if *self.cycle_owner.lock() == Some(me) {
            panic!("exit cycles do not nest: this thread already holds a cycle on this coordinator");
        }
        let lock = self.cycle.lock();
        *self.cycle_owner.lock() = Some(me);
        self.reset();
        self.armed.store(true, Ordering::Release);
        CycleGuard {
            coordinator: self,
            _lock: lock,
        }
    }

    /// Like [`begin_cycle`](Self::begin_cycle), but returns `None` instead of
    /// waiting when another cycle is running or this thread already holds
    /// one.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        let lock = self.cycle.try_lock()?;
        *self.cycle_owner.lock() = Some(thread::current().id());
        self.reset();
        self.armed.store(true, Ordering::Release);
        Some(CycleGuard {
            coordinator: self,
            _lock: lock,
        })
    }
}

/// An armed cycle. Dropping it disarms and resets the coordinator, then
/// lets the next cycle start.
#[derive(Debug)]
#[must_use = "the cycle ends as soon as the guard is dropped"]
pub struct CycleGuard<'c> {
    coordinator: &'c ExitCoordinator,
    _lock: MutexGuard<'c, ()>,
}

impl CycleGuard<'_> {
    #[must_use]
    pub fn coordinator(&self) -> &ExitCoordinator {
        self.coordinator
    }

    #[must_use]
    pub fn first_code(&self) -> Option<i32> {
        self.coordinator.first_code()
    }

    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.coordinator.request_count()
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.armed.store(false, Ordering::Release);
        self.coordinator.reset();
        *self.coordinator.cycle_owner.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Unwound, catch_termination};

    #[test]
    fn first_write_wins() {
        let c = ExitCoordinator::new();
        assert_eq!(c.first_code(), None);
        assert!(c.record(3));
        assert!(!c.record(4));
        assert_eq!(c.first_code(), Some(3));
        assert_eq!(c.request_count(), 2);
    }

    #[test]
    fn extreme_codes_are_representable() {
        let c = ExitCoordinator::new();
        c.record(i32::MIN);
        assert_eq!(c.first_code(), Some(i32::MIN));
        c.reset();
        c.record(i32::MAX);
        assert_eq!(c.first_code(), Some(i32::MAX));
    }

    #[test]
    fn reset_clears_everything() {
        let c = ExitCoordinator::new();
        c.record(1);
        c.reset();
        assert_eq!(c.first_code(), None);
        assert_eq!(c.request_count(), 0);
        assert!(c.record(2));
        assert_eq!(c.first_code(), Some(2));
    }

    #[test]
    fn request_records_then_unwinds() {
        let c = ExitCoordinator::new();
        let result = catch_termination::<()>(|| c.request_termination(12));
        assert!(matches!(result, Err(Unwound::Terminated(s)) if s.code() == 12));
        assert_eq!(c.first_code(), Some(12));

        // A second request still unwinds but does not overwrite.
        let result = catch_termination::<()>(|| c.request_termination(13));
        assert!(matches!(result, Err(Unwound::Terminated(s)) if s.code() == 13));
        assert_eq!(c.first_code(), Some(12));
    }

    #[test]
    fn cycle_guard_arms_and_resets() {
        let c = ExitCoordinator::new();
        c.record(99);
        {
            let guard = c.begin_cycle();
            assert!(c.is_armed());
            assert_eq!(guard.first_code(), None);
            c.record(5);
            assert_eq!(guard.first_code(), Some(5));
            assert_eq!(guard.request_count(), 1);
        }
        assert!(!c.is_armed());
        assert_eq!(c.first_code(), None);
    }

    #[test]
    fn guard_resets_during_unwind() {
        let c = ExitCoordinator::new();
        let result = catch_termination::<()>(|| {
            let _guard = c.begin_cycle();
            c.request_termination(8)
        });
        assert!(result.is_err());
        assert!(!c.is_armed());
        assert_eq!(c.first_code(), None);
        assert!(c.try_begin_cycle().is_some());
    }

    #[test]
    fn try_begin_refuses_while_held() {
        let c = ExitCoordinator::new();
        let guard = c.begin_cycle();
        assert!(c.try_begin_cycle().is_none());
        drop(guard);
        assert!(c.try_begin_cycle().is_some());
    }

    #[test]
    fn nested_cycle_panics() {
        let c = ExitCoordinator::new();
        let _guard = c.begin_cycle();
        let nested = catch_termination(|| {
            let _inner = c.begin_cycle();
        });
        match nested {
            Err(Unwound::Foreign(payload)) => {
                let msg = crate::signal::payload_message(payload.as_ref());
                assert!(msg.contains("do not nest"), "{msg}");
            }
            other => panic!("expected nesting panic, got {other:?}"),
        }
        assert!(c.is_armed());
    }
}
