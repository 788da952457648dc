//! Integration tests for the trellis binary.
//!
//! These tests invoke the trellis binary as a subprocess against a copy of
//! a minimal fixture project. They are marked `#[ignore]` because they
//! need the binary to be pre-built and a POSIX shell.
//!
//! Run with: `cargo test -p trellis --test integration -- --ignored`

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Locate the compiled trellis binary next to the test binary's `deps/`.
fn trellis_binary() -> PathBuf {
    let mut path = std::env::current_exe().expect("could not determine test binary path");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("trellis");
    path
}

/// Copy the minimal fixture into a fresh temporary directory.
fn fixture() -> tempfile::TempDir {
    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/minimal");
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for name in ["trellis.toml", "message.txt"] {
        std::fs::copy(source.join(name), dir.path().join(name)).expect("failed to copy fixture");
    }
    dir
}

fn trellis(dir: &Path, args: &[&str]) -> Output {
    Command::new(trellis_binary())
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to execute trellis")
}

fn assert_success(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "trellis failed (exit={:?}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
        output.status.code(),
    );
    stdout
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn build_writes_journal() {
    let dir = fixture();
    let stdout = assert_success(&trellis(dir.path(), &["build"]));
    assert!(stdout.contains("Building greeting"), "{stdout}");
    assert!(!stdout.contains("discarding the journal"), "{stdout}");

    let journal = dir.path().join("build/.trellis-journal");
    let text = std::fs::read_to_string(&journal).expect("journal was not written");
    let doc: serde_json::Value = serde_json::from_str(&text).expect("journal is not JSON");
    assert_eq!(doc["journalVersion"], 2);
    assert_eq!(
        doc["entries"]["Builtin::Task::greeting"]["result"],
        "hello from the fixture"
    );
}

#[test]
#[ignore]
fn second_build_is_fresh() {
    let dir = fixture();
    assert_success(&trellis(dir.path(), &["build"]));
    let stdout = assert_success(&trellis(dir.path(), &["build"]));
    assert!(!stdout.contains("Building greeting"), "{stdout}");
}

#[test]
#[ignore]
fn edited_input_rebuilds() {
    let dir = fixture();
    assert_success(&trellis(dir.path(), &["build"]));
    std::fs::write(dir.path().join("message.txt"), "changed\n").unwrap();
    let stdout = assert_success(&trellis(dir.path(), &["build", "greeting"]));
    assert!(stdout.contains("Building greeting"), "{stdout}");
}

#[test]
#[ignore]
fn unknown_goal_fails() {
    let dir = fixture();
    let output = trellis(dir.path(), &["build", "nonexistent"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nonexistent"), "{stderr}");
}

#[test]
#[ignore]
fn clean_removes_journal() {
    let dir = fixture();
    assert_success(&trellis(dir.path(), &["build"]));
    let stdout = assert_success(&trellis(dir.path(), &["clean"]));
    assert!(stdout.contains("Removed"), "{stdout}");
    assert!(!dir.path().join("build/.trellis-journal").exists());
}

#[test]
#[ignore]
fn list_prints_declarations() {
    let dir = fixture();
    let stdout = assert_success(&trellis(dir.path(), &["list"]));
    assert!(stdout.contains("phony   default <- greeting"), "{stdout}");
    assert!(stdout.contains("oracle  shell"), "{stdout}");
}
