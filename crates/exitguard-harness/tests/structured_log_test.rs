//! Integration test: structured logging contract.
//!
//! Validates that:
//! 1. The scenario runner writes one cycle_start and one cycle_end per scenario.
//! 2. Every line it writes passes validation.
//! 3. validate_log_file reports violations with line numbers.
//!
//! Run: cargo test -p exitguard-harness --test structured_log_test

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use exitguard_harness::structured_log::{
    LogEmitter, LogLevel, Outcome, event, validate_log_file, validate_log_line,
};
use exitguard_harness::{MarkerSet, Scenario, ScenarioRunner};
use exitguard_membrane::ExitCoordinator;

fn unique_path(prefix: &str, suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{}-{nanos}{suffix}", std::process::id()))
}

#[test]
fn runner_log_lines_are_valid() {
    let coordinator = ExitCoordinator::new();
    let c = &coordinator;
    let mut emitter = LogEmitter::to_buffer("exitguard", "lifecycle");
    let results = ScenarioRunner::new("LoggedClass", &coordinator)
        .run_logged(
            vec![
                Scenario::new("exits_1234", MarkerSet::new().expect_exit_with(1234), move || {
                    c.request_termination(1234)
                }),
                Scenario::new("exits_4567", MarkerSet::new().expect_exit_with(1234), move || {
                    c.request_termination(4567)
                }),
            ],
            &mut emitter,
        )
        .unwrap();
    assert!(results[0].passed());
    assert!(!results[1].passed());

    let lines = emitter.buffered_lines();
    assert_eq!(lines.len(), 4);
    let entries: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| validate_log_line(line, i + 1).unwrap())
        .collect();

    let events: Vec<_> = entries.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(
        events,
        [event::CYCLE_START, event::CYCLE_END, event::CYCLE_START, event::CYCLE_END]
    );
    assert_eq!(entries[0].trace_id, "exitguard::lifecycle::001");
    assert_eq!(entries[1].outcome, Some(Outcome::Pass));
    assert_eq!(entries[1].exit_code, Some(1234));
    assert_eq!(entries[3].outcome, Some(Outcome::Fail));
    assert_eq!(entries[3].level, LogLevel::Error);
    assert_eq!(entries[3].exit_code, Some(4567));
    assert_eq!(
        entries[3].expectation.as_deref(),
        Some("expect-exit-with-code(1234)")
    );
    let message = entries[3].details.as_ref().unwrap()["message"].as_str().unwrap();
    assert!(message.contains("1234") && message.contains("4567"), "{message}");
}

#[test]
fn emitter_writes_file_that_validates() {
    let path = unique_path("exitguard-log", ".jsonl");
    {
        let mut emitter = LogEmitter::to_file(&path, "exitguard", "file").unwrap();
        emitter.emit(LogLevel::Info, event::CYCLE_START).unwrap();
        let end = emitter
            .entry(LogLevel::Info, event::CYCLE_END)
            .with_outcome(Outcome::Pass);
        emitter.emit_entry(end).unwrap();
        emitter.flush().unwrap();
    }
    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 2);
    assert!(errors.is_empty(), "{errors:?}");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn file_validation_reports_line_numbers() {
    let path = unique_path("exitguard-badlog", ".jsonl");
    std::fs::write(
        &path,
        concat!(
            r#"{"timestamp":"t","trace_id":"a::b::001","level":"info","event":"cycle_start"}"#,
            "\n\n",
            r#"{"timestamp":"t","trace_id":"a::b::002","level":"info","event":"cycle_end"}"#,
            "\n",
        ),
    )
    .unwrap();
    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line_number, 3);
    assert_eq!(errors[0].field, "outcome");
    let _ = std::fs::remove_file(&path);
}
