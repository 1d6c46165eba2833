//! Exit-capture membrane for exitguard.
//!
//! This crate sits between code that asks the process to terminate and the
//! real termination primitive. While a test cycle is armed, termination
//! requests are recorded and turned into an unwind of the calling thread
//! instead of ending the process.
//!
//! # Architecture
//!
//! - **Coordinator** (`coordinator`): write-once-wins record of the first
//!   requested exit code, plus the cycle guard that arms and resets it
//! - **Signal** (`signal`): typed unwind payload raised on the requesting
//!   thread and recovered at the test boundary
//! - **Redirect entry point** (`redirect`): `exit()`, a drop-in for
//!   `std::process::exit` backed by the process-wide coordinator
//!
//! Interception relies on unwinding. Binaries built with `panic = "abort"`
//! abort the process on the first intercepted request.

#![deny(unsafe_code)]

pub mod coordinator;
pub mod redirect;
pub mod signal;

pub use coordinator::{CycleGuard, ExitCoordinator};
pub use redirect::{exit, global, real_exit};
pub use signal::{TerminationSignal, Unwound, catch_termination, payload_message};
