//! The termination signal and the boundary that recovers it.
//!
//! An intercepted exit unwinds the requesting thread with a
//! [`TerminationSignal`] payload. The payload is raised with
//! [`std::panic::resume_unwind`], which skips the panic hook, so an
//! intercepted exit prints nothing. Recovery is a typed downcast.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Unwind payload carrying the requested exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminationSignal {
    code: i32,
}

impl TerminationSignal {
    #[must_use]
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// Exit code passed to the intercepted call.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.code
    }

    /// Unwind the current thread with this signal. Never returns.
    pub fn raise(self) -> ! {
        panic::resume_unwind(Box::new(self))
    }

    /// Recover a signal from a caught unwind payload.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Option<Self> {
        payload.downcast_ref::<Self>().copied()
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit({}) intercepted", self.code)
    }
}

/// Why a guarded closure did not return normally.
#[derive(Debug)]
pub enum Unwound {
    /// The closure requested termination.
    Terminated(TerminationSignal),
    /// Any other panic. Resume it with [`Unwound::resume`] to propagate it
    /// unchanged.
    Foreign(Box<dyn Any + Send>),
}

impl Unwound {
    /// Sort a caught payload.
    #[must_use]
    pub fn classify(payload: Box<dyn Any + Send>) -> Self {
        match TerminationSignal::from_payload(payload.as_ref()) {
            Some(signal) => Self::Terminated(signal),
            None => Self::Foreign(payload),
        }
    }

    /// Continue unwinding with the original payload.
    pub fn resume(self) -> ! {
        match self {
            Self::Terminated(signal) => signal.raise(),
            Self::Foreign(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Run `f`, catching any unwind and sorting termination signals from other
/// panics.
///
/// # Errors
///
/// Returns [`Unwound`] when `f` unwinds.
pub fn catch_termination<R>(f: impl FnOnce() -> R) -> Result<R, Unwound> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Unwound::classify)
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(signal) = TerminationSignal::from_payload(payload) {
        signal.to_string()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
