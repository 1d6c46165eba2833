//! Integration test: `exit` outside a cycle ends the process with the code.
//!
//! Each case re-runs this test binary filtered to a single test, with an
//! environment variable telling that child which code to exit with.
//!
//! Run: cargo test -p exitguard-membrane --test redirect_exit_status_test

use std::process::Command;

use exitguard_membrane::{exit, global};

const CHILD_CODE_ENV: &str = "EXITGUARD_TEST_CHILD_EXIT_CODE";

fn run_child(test_name: &str, code: i32) -> std::process::Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args(["--exact", test_name, "--test-threads=1", "--nocapture"])
        .env(CHILD_CODE_ENV, code.to_string())
        .output()
        .unwrap()
}

fn child_code() -> Option<i32> {
    std::env::var(CHILD_CODE_ENV).ok().map(|v| v.parse().unwrap())
}

#[test]
fn unarmed_exit_terminates_with_requested_code() {
    if let Some(code) = child_code() {
        assert!(!global().is_armed());
        exit(code);
    }

    for code in [3, 42, 200] {
        let output = run_child("unarmed_exit_terminates_with_requested_code", code);
        assert_eq!(
            output.status.code(),
            Some(code),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

#[test]
fn exit_after_cycle_ends_terminates_with_requested_code() {
    if let Some(code) = child_code() {
        {
            let cycle = global().begin_cycle();
            assert!(cycle.first_code().is_none());
        }
        exit(code);
    }

    let output = run_child("exit_after_cycle_ends_terminates_with_requested_code", 9);
    assert_eq!(output.status.code(), Some(9));
}
