// Integration tests for command-line resolution through the built binary

use std::process::Command;

fn ferryd_binary() -> &'static str {
    env!("CARGO_BIN_EXE_ferryd")
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(ferryd_binary())
        .args(args)
        .env_remove("FERRYD_DEBUG")
        .output()
        .expect("Failed to execute ferryd")
}

#[test]
fn test_help_exits_zero_with_usage() {
    let output = run(&["-h"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-t <count>"));
    assert!(stdout.contains("worker threads"));
    assert!(stdout.contains("8765"));
    assert!(stdout.contains("-m <module>"));
}

#[test]
fn test_unknown_flag_prints_usage_and_fails() {
    let output = run(&["-x"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown option '-x'"));
    assert!(stderr.contains("-m <module>"));
}

#[test]
fn test_missing_argument_prints_usage_and_fails() {
    let output = run(&["-p"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("option -p requires an argument"));
    assert!(stderr.contains("-p <port>"));
}

#[test]
fn test_node_identity_rejects_unspecified() {
    let output = run(&["-n", "0.0.0.0"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unspecified or loopback"));
}

#[test]
fn test_node_identity_rejects_loopback() {
    let output = run(&["-n", "127.0.0.1"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unspecified or loopback"));
}

#[test]
fn test_node_identity_rejects_garbage() {
    let output = run(&["-n", "not-an-ip"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must be an IPv4 address"));
}

#[test]
fn test_worker_count_validation() {
    for bad in ["0", "-5", "abc"] {
        let output = run(&["-t", bad]);
        assert!(!output.status.success(), "-t {bad} should be rejected");

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("worker thread count"),
            "unexpected stderr for -t {bad}: {stderr}"
        );
    }
}

#[test]
fn test_bad_port_is_rejected() {
    let output = run(&["-p", "70000"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid port '70000'"));
}

#[test]
fn test_missing_module_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let dir_arg = dir.path().to_string_lossy().to_string();

    let output = run(&["-l", &dir_arg, "-m", "router_ext"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("module 'router_ext' not found"));
}
