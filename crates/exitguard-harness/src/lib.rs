//! Test-side tooling for exitguard.
//!
//! This crate provides:
//! - Expectations: what a test declares about exit calls, chosen by markers
//! - Lifecycle: the arm/run/evaluate/reset cycle around one test body
//! - Assertions: closure-based exit checks usable in any test
//! - Scenario runner: named and parameterized scenarios with per-cycle logs
//! - Tree rewriting: offline rewrite of a directory of compiled units
//! - Structured logging: JSONL records, validation, and artifact indexes

#![forbid(unsafe_code)]

pub mod assertions;
pub mod class_rewrite;
pub mod expectation;
pub mod lifecycle;
pub mod runner;
pub mod structured_log;

pub use assertions::{
    ExitAssertion, assert_calls_exit, assert_calls_exit_with, assert_does_not_call_exit,
    assert_does_not_call_exit_with, catch_exit, catch_exit_with,
};
pub use class_rewrite::{OutputRecord, TreeRewriteError, TreeSummary, rewrite_tree};
pub use expectation::{ExpectationSpec, ExpectationViolated, MarkerSet};
pub use lifecycle::{CycleOutcome, TestFailure, TestLifecycleController, run_exit_test};
pub use runner::{Scenario, ScenarioResult, ScenarioRunner};
