//! End-to-end tests driving the built binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pipemeter"))
}

/// Runs the binary with the given arguments, feeding `input` on stdin.
fn run_with_stdin(args: &[&str], input: &[u8]) -> Output {
    let mut child = binary()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn pipemeter");
    child
        .stdin
        .take()
        .expect("stdin handle")
        .write_all(input)
        .expect("feed stdin");
    child.wait_with_output().expect("collect output")
}

fn run_plain(args: &[&str]) -> Output {
    binary()
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("run pipemeter")
}

#[test]
fn short_deterministic_transfer() {
    let output = run_with_stdin(&["-q", "-s", "6"], b"hello\n");
    assert!(output.status.success(), "status: {:?}", output.status);
    assert_eq!(output.stdout, b"hello\n");
    assert!(output.stderr.is_empty(), "stderr: {:?}", output.stderr);
}

#[test]
fn copies_binary_data_byte_exact() {
    // Kept below the pipe buffer size so the unidirectional feed-then-
    // collect pattern cannot deadlock.
    let payload: Vec<u8> = (0..40_000u32).map(|value| (value % 256) as u8).collect();
    let output = run_with_stdin(&["-q"], &payload);
    assert!(output.status.success());
    assert_eq!(output.stdout, payload);
}

#[test]
fn line_mode_copies_everything_including_trailing_partial_line() {
    let output = run_with_stdin(&["-q", "-l"], b"A\nB\nC\nD");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"A\nB\nC\nD");
}

#[test]
fn concatenates_files_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    std::fs::write(&first, "one\n").expect("write first");
    std::fs::write(&second, "two\n").expect("write second");

    let output = run_plain(&[
        "-q",
        first.to_str().expect("utf8 path"),
        second.to_str().expect("utf8 path"),
    ]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"one\ntwo\n");
}

#[test]
fn missing_input_sets_the_access_bit() {
    let output = run_plain(&["-q", "/definitely/not/here"]);
    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/definitely/not/here"), "stderr: {stderr}");
}

#[test]
fn missing_input_is_skipped_and_remaining_files_transfer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let present = dir.path().join("present");
    std::fs::write(&present, "kept\n").expect("write");

    let output = run_plain(&[
        "-q",
        "/definitely/not/here",
        present.to_str().expect("utf8 path"),
    ]);
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(output.stdout, b"kept\n");
}

#[test]
fn numeric_mode_ends_at_one_hundred_percent() {
    let output = run_with_stdin(&["-n", "-s", "6"], b"hello\n");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr.lines().last().expect("at least the final update");
    assert_eq!(last.trim_end(), "100");
}

#[test]
fn output_file_receives_the_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("copied");
    let output = run_with_stdin(
        &["-q", "-o", target.to_str().expect("utf8 path")],
        b"file contents\n",
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert_eq!(
        std::fs::read(&target).expect("read back"),
        b"file contents\n"
    );
}

#[test]
fn sparse_output_preserves_the_logical_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("sparse");
    let mut payload = vec![0u8; 65_536];
    payload[0] = b'x';
    payload[65_535] = b'y';

    let output = run_with_stdin(
        &["-q", "-X", "-o", target.to_str().expect("utf8 path")],
        &payload,
    );
    assert!(output.status.success());
    assert_eq!(std::fs::read(&target).expect("read back"), payload);
}

#[test]
fn version_and_help() {
    let version = run_plain(&["--version"]);
    assert!(version.status.success());
    assert!(String::from_utf8_lossy(&version.stdout).contains("pipemeter"));

    let help = run_plain(&["--help"]);
    assert!(help.status.success());
    let text = String::from_utf8_lossy(&help.stdout);
    assert!(text.contains("--rate-limit"));
    assert!(text.contains("--line-mode"));
}

#[test]
fn stats_line_appears_on_stderr() {
    let output = run_with_stdin(&["-q", "-v", "-s", "6"], b"hello\n");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("rate min/avg/max/mdev") || stderr.contains("rate not measured"),
        "stderr: {stderr}"
    );
}

#[test]
fn stop_at_size_truncates_the_stream() {
    let output = run_with_stdin(&["-q", "-S", "-s", "4"], b"abcdefgh");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"abcd");
}

#[test]
fn null_terminated_line_mode_copies_exactly() {
    let output = run_with_stdin(&["-q", "-l", "-0"], b"one\0two\0tail");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"one\0two\0tail");
}
