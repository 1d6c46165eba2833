//! Integration test: offline rewrite of a directory of compiled units.
//!
//! Run: cargo test -p exitguard-harness --test class_rewrite_test

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use exitguard_core::{Disposition, ExitCallRewriter};
use exitguard_fixtures::{ClassFixture, MARKER, MethodFixture, exit_caller, find_all};
use exitguard_harness::structured_log::{LogEmitter, validate_log_line};
use exitguard_harness::{TreeRewriteError, rewrite_tree};

fn unique_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()))
}

fn write(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn tree_is_rewritten_with_layout_preserved() {
    let input = unique_dir("exitguard-tree-in");
    let output = unique_dir("exitguard-tree-out");

    let app = exit_caller("com/acme/App", 3);
    let reserved = exit_caller("java/lang/Shutdown", 1);
    let exempt = ClassFixture::new("com/acme/Exempt")
        .with_method(
            MethodFixture::new("keep", "()V")
                .call_exit(1)
                .returns()
                .annotate(MARKER),
        )
        .with_method(MethodFixture::new("swap", "()V").call_exit(2).returns())
        .build();
    let plain = ClassFixture::new("com/acme/Plain")
        .with_method(MethodFixture::new("run", "()V").returns())
        .build();

    write(&input, "com/acme/App.class", &app);
    write(&input, "com/acme/Exempt.class", &exempt);
    write(&input, "com/acme/Plain.class", &plain);
    write(&input, "java/lang/Shutdown.class", &reserved);
    write(&input, "META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n");

    let mut emitter = LogEmitter::to_buffer("exitguard", "tree");
    let summary = rewrite_tree(
        &ExitCallRewriter::default(),
        &input,
        &output,
        Some(&mut emitter),
    )
    .unwrap();

    assert_eq!(summary.units(), 4);
    assert_eq!(summary.rewritten, 2);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.reserved, 1);
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.sites_replaced, 2);
    assert_eq!(summary.sites_exempt, 1);

    let rewritten_app = fs::read(output.join("com/acme/App.class")).unwrap();
    assert_ne!(rewritten_app, app);
    assert!(!find_all(&rewritten_app, b"handleExit").is_empty());
    assert_eq!(fs::read(output.join("com/acme/Plain.class")).unwrap(), plain);
    assert_eq!(fs::read(output.join("java/lang/Shutdown.class")).unwrap(), reserved);
    assert_eq!(
        fs::read(output.join("META-INF/MANIFEST.MF")).unwrap(),
        b"Manifest-Version: 1.0\n"
    );

    let dispositions: Vec<_> = summary
        .outputs
        .iter()
        .map(|o| (o.relative.as_str(), o.disposition))
        .collect();
    assert_eq!(
        dispositions,
        [
            ("META-INF/MANIFEST.MF", None),
            ("com/acme/App.class", Some(Disposition::Rewritten)),
            ("com/acme/Exempt.class", Some(Disposition::Rewritten)),
            ("com/acme/Plain.class", Some(Disposition::Unchanged)),
            ("java/lang/Shutdown.class", Some(Disposition::Reserved)),
        ]
    );

    let lines = emitter.buffered_lines();
    for (i, line) in lines.iter().enumerate() {
        validate_log_line(line, i + 1).unwrap();
    }
    let events: Vec<String> = lines
        .iter()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            format!("{}:{}", v["event"].as_str().unwrap(), v["unit"].as_str().unwrap())
        })
        .collect();
    assert_eq!(
        events,
        [
            "site_rewritten:com/acme/App",
            "unit_rewritten:com/acme/App",
            "site_exempt:com/acme/Exempt",
            "site_rewritten:com/acme/Exempt",
            "unit_rewritten:com/acme/Exempt",
            "unit_unchanged:com/acme/Plain",
            "unit_skipped:java/lang/Shutdown",
        ]
    );

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}

#[test]
fn first_rejected_unit_stops_the_run() {
    let input = unique_dir("exitguard-reject-in");
    let output = unique_dir("exitguard-reject-out");
    let mut broken = exit_caller("com/acme/Broken", 1);
    broken.truncate(broken.len() - 4);
    write(&input, "com/acme/Broken.class", &broken);

    let mut emitter = LogEmitter::to_buffer("exitguard", "reject");
    let err = rewrite_tree(
        &ExitCallRewriter::default(),
        &input,
        &output,
        Some(&mut emitter),
    )
    .unwrap_err();
    match &err {
        TreeRewriteError::Rejected { path, source } => {
            assert!(path.ends_with("com/acme/Broken.class"));
            assert_eq!(source.identifier, "com/acme/Broken");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(err.to_string().contains("com/acme/Broken"));
    assert!(!output.join("com/acme/Broken.class").exists());

    let lines = emitter.buffered_lines();
    assert_eq!(lines.len(), 1);
    let entry = validate_log_line(&lines[0], 1).unwrap();
    assert_eq!(entry.event, "unit_rejected");

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}
