//! Redirect entry point backed by the process-wide coordinator.

use crate::coordinator::ExitCoordinator;

static GLOBAL: ExitCoordinator = ExitCoordinator::new();

/// The coordinator behind [`exit`]. Test harnesses that intercept calls made
/// through `exit` must arm cycles on this instance.
#[must_use]
pub fn global() -> &'static ExitCoordinator {
    &GLOBAL
}

/// Drop-in replacement for [`std::process::exit`].
///
/// While a cycle is armed on [`global`] the request is recorded and the
/// calling thread unwinds. Otherwise the process terminates with `code`.
pub fn exit(code: i32) -> ! {
    let coordinator = global();
    if coordinator.is_armed() {
        coordinator.request_termination(code)
    }
    real_exit(code)
}

/// The real primitive. Never intercepted.
pub fn real_exit(code: i32) -> ! {
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Unwound, catch_termination};

    #[test]
    fn armed_global_intercepts_exit() {
        let guard = global().begin_cycle();
        let result = catch_termination::<()>(|| exit(17));
        assert!(matches!(result, Err(Unwound::Terminated(s)) if s.code() == 17));
        assert_eq!(guard.first_code(), Some(17));
    }
}
