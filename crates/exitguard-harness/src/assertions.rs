//! Assertion-style exit checks.
//!
//! Each call wraps one closure in a full cycle, so it can be used inside any
//! test without markers:
//!
//! ```no_run
//! use exitguard_harness::assertions::{assert_calls_exit, assert_does_not_call_exit};
//!
//! assert_calls_exit(|| exitguard_membrane::exit(3)).with_exit_code(3);
//! assert_does_not_call_exit(|| {});
//! ```

use exitguard_membrane::{ExitCoordinator, Unwound, catch_termination};

/// Run `f` in a cycle on the global coordinator and return the first exit
/// code it requested. Non-signal panics propagate unchanged.
pub fn catch_exit(f: impl FnOnce()) -> Option<i32> {
    catch_exit_with(exitguard_membrane::global(), f)
}

/// [`catch_exit`] against an explicit coordinator.
pub fn catch_exit_with(coordinator: &ExitCoordinator, f: impl FnOnce()) -> Option<i32> {
    let cycle = coordinator.begin_cycle();
    let result = catch_termination(f);
    let observed = cycle.first_code();
    drop(cycle);
    match result {
        Ok(()) | Err(Unwound::Terminated(_)) => observed,
        Err(foreign @ Unwound::Foreign(_)) => foreign.resume(),
    }
}

/// Assert that `f` requests termination. Chain code checks on the result.
///
/// # Panics
///
/// Panics with "Expected call to exit() did not happen" when no request was
/// made.
#[track_caller]
pub fn assert_calls_exit(f: impl FnOnce()) -> ExitAssertion {
    assert_calls_exit_with(exitguard_membrane::global(), f)
}

/// [`assert_calls_exit`] against an explicit coordinator.
#[track_caller]
pub fn assert_calls_exit_with(coordinator: &ExitCoordinator, f: impl FnOnce()) -> ExitAssertion {
    match catch_exit_with(coordinator, f) {
        Some(code) => ExitAssertion { code },
        None => panic!("Expected call to exit() did not happen"),
    }
}

/// Assert that `f` does not request termination.
///
/// # Panics
///
/// Panics naming the exit code when a request was made.
#[track_caller]
pub fn assert_does_not_call_exit(f: impl FnOnce()) {
    assert_does_not_call_exit_with(exitguard_membrane::global(), f);
}

/// [`assert_does_not_call_exit`] against an explicit coordinator.
#[track_caller]
pub fn assert_does_not_call_exit_with(coordinator: &ExitCoordinator, f: impl FnOnce()) {
    if let Some(code) = catch_exit_with(coordinator, f) {
        panic!("Unexpected call to exit() with exit code {code}");
    }
}

/// A captured exit, ready for code checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitAssertion {
    code: i32,
}

impl ExitAssertion {
    /// First code requested by the closure.
    #[must_use]
    pub fn code(self) -> i32 {
        self.code
    }

    /// # Panics
    ///
    /// Panics when the captured code differs from `expected`.
    #[track_caller]
    pub fn with_exit_code(self, expected: i32) -> Self {
        if self.code != expected {
            panic!(
                "Wrong exit code found: expected {expected} but was {}",
                self.code
            );
        }
        self
    }

    /// Check that the captured code lies in `start..=end`.
    ///
    /// # Panics
    ///
    /// Panics when `start >= end`, or when the code is outside the range.
    #[track_caller]
    pub fn with_exit_code_in_range(self, start: i32, end: i32) -> Self {
        if start >= end {
            panic!("Start must come before end");
        }
        if !(start..=end).contains(&self.code) {
            panic!(
                "Exit code expected in range ({start} .. {end}) but was {}",
                self.code
            );
        }
        self
    }
}
