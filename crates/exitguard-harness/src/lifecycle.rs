//! Per-test arm/run/evaluate/reset cycle.
//!
//! A controller arms its coordinator, runs the body, reads the first
//! recorded code and disarms before judging the result. The coordinator is
//! reset when the cycle is armed and again when it ends, whether the body
//! returned, requested termination, failed, or panicked. The controller is
//! mutably borrowed for the whole cycle, so between calls it is always idle;
//! [`ExitCoordinator::is_armed`] is the live view from inside a body.

use exitguard_membrane::{ExitCoordinator, Unwound, catch_termination};
use thiserror::Error;

use crate::expectation::{ExpectationSpec, ExpectationViolated, MarkerSet};

/// What one cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub expectation: ExpectationSpec,
    /// First code recorded during the cycle.
    pub observed: Option<i32>,
    /// Every request recorded during the cycle, including losers of the
    /// first-write race.
    pub requests: u64,
    /// The body itself was cut short by the termination signal.
    pub unwound_by_signal: bool,
}

impl CycleOutcome {
    /// Evaluate the observed code against the expectation.
    ///
    /// # Errors
    ///
    /// Returns the violation when the expectation was not met.
    pub fn verdict(&self) -> Result<(), ExpectationViolated> {
        self.expectation.evaluate(self.observed)
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict().is_ok()
    }
}

/// Failure of a cycle whose body may itself return an error.
#[derive(Debug, Error)]
pub enum TestFailure<E> {
    #[error(transparent)]
    Expectation(#[from] ExpectationViolated),
    #[error("test body failed: {0}")]
    Body(E),
}

/// Runs test bodies inside exit-capture cycles on one coordinator.
#[derive(Debug)]
pub struct TestLifecycleController<'c> {
    coordinator: &'c ExitCoordinator,
    last: Option<CycleOutcome>,
}

impl TestLifecycleController<'static> {
    /// A controller on the coordinator behind [`exitguard_membrane::exit`].
    #[must_use]
    pub fn global() -> Self {
        Self::new(exitguard_membrane::global())
    }
}

impl<'c> TestLifecycleController<'c> {
    #[must_use]
    pub fn new(coordinator: &'c ExitCoordinator) -> Self {
        Self {
            coordinator,
            last: None,
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &'c ExitCoordinator {
        self.coordinator
    }

    /// Outcome of the most recent finished cycle, passed or not.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&CycleOutcome> {
        self.last.as_ref()
    }

    /// Run `body` in one cycle and judge it against `expectation`.
    ///
    /// A panic other than the termination signal is resumed unchanged after
    /// the coordinator has been reset.
    ///
    /// # Errors
    ///
    /// Returns the violation when the expectation was not met.
    pub fn run(
        &mut self,
        expectation: ExpectationSpec,
        body: impl FnOnce(),
    ) -> Result<CycleOutcome, ExpectationViolated> {
        match self.run_fallible(expectation, || Ok::<(), std::convert::Infallible>(body())) {
            Ok(outcome) => Ok(outcome),
            Err(TestFailure::Expectation(violation)) => Err(violation),
            Err(TestFailure::Body(never)) => match never {},
        }
    }

    /// Resolve the expectation from method and class markers, then
    /// [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns the violation when the expectation was not met.
    pub fn run_markers(
        &mut self,
        method: &MarkerSet,
        class: &MarkerSet,
        body: impl FnOnce(),
    ) -> Result<CycleOutcome, ExpectationViolated> {
        self.run(MarkerSet::resolve(method, class), body)
    }

    /// Like [`run`](Self::run) for bodies that return `Result`. A body error
    /// takes precedence over the expectation verdict.
    ///
    /// # Errors
    ///
    /// [`TestFailure::Body`] when the body returned an error, otherwise
    /// [`TestFailure::Expectation`] when the expectation was not met.
    pub fn run_fallible<E>(
        &mut self,
        expectation: ExpectationSpec,
        body: impl FnOnce() -> Result<(), E>,
    ) -> Result<CycleOutcome, TestFailure<E>> {
        let guard = self.coordinator.begin_cycle();
        let result = catch_termination(body);

        let observed = guard.first_code();
        let requests = guard.request_count();
        drop(guard);

        let (body_result, unwound_by_signal) = match result {
            Ok(r) => (r, false),
            Err(Unwound::Terminated(_)) => (Ok(()), true),
            Err(foreign @ Unwound::Foreign(_)) => {
                self.last = None;
                foreign.resume()
            }
        };

        let outcome = CycleOutcome {
            expectation,
            observed,
            requests,
            unwound_by_signal,
        };
        self.last = Some(outcome);
        body_result.map_err(TestFailure::Body)?;
        outcome.verdict()?;
        Ok(outcome)
    }
}

/// Run `body` as a test on the global coordinator, panicking with the
/// violation message when the resolved expectation is not met.
#[track_caller]
pub fn run_exit_test(method: &MarkerSet, class: &MarkerSet, body: impl FnOnce()) -> CycleOutcome {
    let mut controller = TestLifecycleController::global();
    match controller.run_markers(method, class, body) {
        Ok(outcome) => outcome,
        Err(violation) => panic!("{violation}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_arms_only_while_body_runs() {
        let coordinator = ExitCoordinator::new();
        let mut controller = TestLifecycleController::new(&coordinator);
        assert!(!coordinator.is_armed());
        let outcome = controller
            .run(ExpectationSpec::ExpectAnyExit, || {
                assert!(coordinator.is_armed());
                coordinator.request_termination(3)
            })
            .unwrap();
        assert_eq!(outcome.observed, Some(3));
        assert!(outcome.unwound_by_signal);
        assert!(!coordinator.is_armed());
        assert_eq!(coordinator.first_code(), None);
    }

    #[test]
    fn failed_cycle_still_resets() {
        let coordinator = ExitCoordinator::new();
        let mut controller = TestLifecycleController::new(&coordinator);
        let err = controller
            .run(ExpectationSpec::ExpectNoExit, || coordinator.request_termination(1))
            .unwrap_err();
        assert_eq!(err.observed(), Some(1));
        assert_eq!(coordinator.first_code(), None);
        assert_eq!(controller.last_outcome().map(|o| o.observed), Some(Some(1)));
    }

    #[test]
    fn body_error_wins_over_verdict() {
        let coordinator = ExitCoordinator::new();
        let mut controller = TestLifecycleController::new(&coordinator);
        let err = controller
            .run_fallible(ExpectationSpec::ExpectAnyExit, || Err("setup failed"))
            .unwrap_err();
        assert!(matches!(err, TestFailure::Body("setup failed")));
        assert_eq!(err.to_string(), "test body failed: setup failed");
    }

    #[test]
    fn fallible_expectation_failure_is_transparent() {
        let coordinator = ExitCoordinator::new();
        let mut controller = TestLifecycleController::new(&coordinator);
        let err = controller
            .run_fallible(ExpectationSpec::ExpectAnyExit, || Ok::<(), String>(()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected call to exit() did not happen (expected: expect-any-exit, observed: none)"
        );
    }
}
