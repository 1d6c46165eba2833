//! Exit expectations and the markers that select them.

use std::fmt;

use thiserror::Error;

/// What a test declares about termination requests made by its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExpectationSpec {
    /// No request may happen.
    #[default]
    ExpectNoExit,
    /// At least one request must happen, any code.
    ExpectAnyExit,
    /// The first request must carry this code.
    ExpectExitWithCode(i32),
    /// Any request fails the test.
    FailOnAnyExit,
}

impl ExpectationSpec {
    /// Judge the first recorded code of a finished cycle.
    ///
    /// # Errors
    ///
    /// Returns the violation when `observed` does not satisfy `self`.
    pub fn evaluate(self, observed: Option<i32>) -> Result<(), ExpectationViolated> {
        match (self, observed) {
            (Self::ExpectNoExit | Self::FailOnAnyExit, None) => Ok(()),
            (Self::ExpectNoExit | Self::FailOnAnyExit, Some(code)) => {
                Err(ExpectationViolated::UnexpectedExit {
                    expectation: self,
                    code,
                })
            }
            (Self::ExpectAnyExit, Some(_)) => Ok(()),
            (Self::ExpectAnyExit, None) => Err(ExpectationViolated::MissingExit),
            (Self::ExpectExitWithCode(expected), Some(code)) if code == expected => Ok(()),
            (Self::ExpectExitWithCode(expected), Some(observed)) => {
                Err(ExpectationViolated::WrongExitCode { expected, observed })
            }
            (Self::ExpectExitWithCode(expected), None) => {
                Err(ExpectationViolated::MissingExitWithCode { expected })
            }
        }
    }
}

impl fmt::Display for ExpectationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectNoExit => f.write_str("expect-no-exit"),
            Self::ExpectAnyExit => f.write_str("expect-any-exit"),
            Self::ExpectExitWithCode(code) => write!(f, "expect-exit-with-code({code})"),
            Self::FailOnAnyExit => f.write_str("fail-on-any-exit"),
        }
    }
}

/// A finished cycle that did not meet its expectation. Every variant names
/// what was expected and what was observed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpectationViolated {
    #[error("Unexpected call to exit() with exit code {code} (expected: {expectation})")]
    UnexpectedExit {
        expectation: ExpectationSpec,
        code: i32,
    },
    #[error("Expected call to exit() did not happen (expected: expect-any-exit, observed: none)")]
    MissingExit,
    #[error("Expected call to exit() with exit code {expected} did not happen (observed: none)")]
    MissingExitWithCode { expected: i32 },
    #[error("Wrong exit code found: expected {expected} but was {observed}")]
    WrongExitCode { expected: i32, observed: i32 },
}

impl ExpectationViolated {
    #[must_use]
    pub fn expected(&self) -> ExpectationSpec {
        match self {
            Self::UnexpectedExit { expectation, .. } => *expectation,
            Self::MissingExit => ExpectationSpec::ExpectAnyExit,
            Self::MissingExitWithCode { expected } | Self::WrongExitCode { expected, .. } => {
                ExpectationSpec::ExpectExitWithCode(*expected)
            }
        }
    }

    #[must_use]
    pub fn observed(&self) -> Option<i32> {
        match self {
            Self::UnexpectedExit { code, .. } => Some(*code),
            Self::WrongExitCode { observed, .. } => Some(*observed),
            Self::MissingExit | Self::MissingExitWithCode { .. } => None,
        }
    }
}

/// Markers attached to one test method or one test class.
///
/// More than one expectation marker may be present; [`MarkerSet::expectation`]
/// picks fail-on-any-exit, then no-exit-allowed, then expect-exit with a
/// code, then expect-exit without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerSet {
    no_exit: bool,
    expect_exit: Option<Option<i32>>,
    fail_on_exit: bool,
}

impl MarkerSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            no_exit: false,
            expect_exit: None,
            fail_on_exit: false,
        }
    }

    #[must_use]
    pub const fn no_exit_allowed(mut self) -> Self {
        self.no_exit = true;
        self
    }

    #[must_use]
    pub const fn expect_exit(mut self) -> Self {
        if self.expect_exit.is_none() {
            self.expect_exit = Some(None);
        }
        self
    }

    #[must_use]
    pub const fn expect_exit_with(mut self, code: i32) -> Self {
        self.expect_exit = Some(Some(code));
        self
    }

    #[must_use]
    pub const fn fail_on_exit(mut self) -> Self {
        self.fail_on_exit = true;
        self
    }

    /// The expectation declared at this level, if any.
    #[must_use]
    pub const fn expectation(&self) -> Option<ExpectationSpec> {
        if self.fail_on_exit {
            Some(ExpectationSpec::FailOnAnyExit)
        } else if self.no_exit {
            Some(ExpectationSpec::ExpectNoExit)
        } else {
            match self.expect_exit {
                Some(Some(code)) => Some(ExpectationSpec::ExpectExitWithCode(code)),
                Some(None) => Some(ExpectationSpec::ExpectAnyExit),
                None => None,
            }
        }
    }

    /// Method markers override class markers. With neither, no request is
    /// allowed.
    #[must_use]
    pub const fn resolve(method: &Self, class: &Self) -> ExpectationSpec {
        match method.expectation() {
            Some(spec) => spec,
            None => match class.expectation() {
                Some(spec) => spec,
                None => ExpectationSpec::ExpectNoExit,
            },
        }
    }
}
