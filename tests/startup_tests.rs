// End-to-end startup and shutdown tests through the built binary

use std::net::{TcpListener, TcpStream};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

fn ferryd_binary() -> &'static str {
    env!("CARGO_BIN_EXE_ferryd")
}

/// Reserve a free port by binding to an ephemeral one and releasing it.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn spawn_broker(args: &[&str]) -> Child {
    Command::new(ferryd_binary())
        .args(args)
        .env_remove("FERRYD_DEBUG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn ferryd")
}

fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn signal_and_collect(mut child: Child, signal: i32) -> Output {
    unsafe {
        libc::kill(child.id() as i32, signal);
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match child.try_wait().expect("Failed to poll child") {
            Some(_) => break,
            None if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(50))
            }
            None => {
                child.kill().ok();
                break;
            }
        }
    }
    child.wait_with_output().expect("Failed to collect output")
}

#[test]
fn test_foreground_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let queue_path = dir.path().join("queues");
    let port = free_port();
    let port_arg = port.to_string();

    let child = spawn_broker(&[
        "-D",
        "-n",
        "10.0.0.5",
        "-p",
        &port_arg,
        "-t",
        "2",
        "-c",
        config_path.to_str().unwrap(),
        "-q",
        queue_path.to_str().unwrap(),
    ]);

    assert!(
        wait_for_port(port, Duration::from_secs(10)),
        "listener never came up on port {port}"
    );
    assert!(queue_path.is_dir());
    let manifest = std::fs::read_to_string(&config_path).unwrap();
    assert!(manifest.contains("10.0.0.5"));

    let output = signal_and_collect(child, libc::SIGTERM);
    assert!(
        output.status.success(),
        "orderly shutdown should exit 0, got {:?}",
        output.status
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("worker pool started"));
    assert!(stderr.contains("count=2"));
    assert!(stderr.contains("listening"));
    assert!(stderr.contains("shutdown complete"));
}

#[test]
fn test_default_port_is_8765() {
    let dir = tempfile::tempdir().unwrap();

    let child = spawn_broker(&[
        "-D",
        "-n",
        "10.0.0.5",
        "-c",
        dir.path().join("config.json").to_str().unwrap(),
        "-q",
        dir.path().join("queues").to_str().unwrap(),
    ]);

    let up = wait_for_port(8765, Duration::from_secs(10));
    let output = signal_and_collect(child, libc::SIGTERM);
    assert!(up, "listener not reachable on the default port: {:?}", output);
}

#[test]
fn test_listener_bind_conflict_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = TcpListener::bind("0.0.0.0:0").unwrap();
    let port_arg = occupied.local_addr().unwrap().port().to_string();

    let child = spawn_broker(&[
        "-D",
        "-n",
        "10.0.0.5",
        "-p",
        &port_arg,
        "-c",
        dir.path().join("config.json").to_str().unwrap(),
        "-q",
        dir.path().join("queues").to_str().unwrap(),
    ]);

    let output = child.wait_with_output().expect("Failed to collect output");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("listener could not start"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_daemonized_startup_detaches_and_silences_stdio() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    // Occupy the port so the background daemon exits on its own after
    // writing the manifest; nothing is left running once the test ends.
    let occupied = TcpListener::bind("0.0.0.0:0").unwrap();
    let port_arg = occupied.local_addr().unwrap().port().to_string();

    let child = spawn_broker(&[
        "-n",
        "10.0.0.5",
        "-p",
        &port_arg,
        "-c",
        config_path.to_str().unwrap(),
        "-q",
        dir.path().join("queues").to_str().unwrap(),
    ]);

    // The invoking process is the pre-fork parent: it must exit 0
    // immediately, with descriptors already pointed at /dev/null.
    let output = child.wait_with_output().expect("Failed to collect output");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());

    // The detached daemon keeps running long enough to write the manifest
    assert!(
        wait_for_file(&config_path, Duration::from_secs(10)),
        "daemon never initialized its store"
    );

    // Give the daemon time to hit the bind conflict and exit before the
    // temp dir is removed
    std::thread::sleep(Duration::from_millis(500));
}

#[cfg(feature = "crash-reports")]
#[test]
fn test_fatal_signal_produces_crash_report() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let port_arg = port.to_string();

    let child = spawn_broker(&[
        "-D",
        "-B",
        "-n",
        "10.0.0.5",
        "-p",
        &port_arg,
        "-c",
        dir.path().join("config.json").to_str().unwrap(),
        "-q",
        dir.path().join("queues").to_str().unwrap(),
    ]);

    assert!(wait_for_port(port, Duration::from_secs(10)));
    let output = signal_and_collect(child, libc::SIGSEGV);

    assert!(!output.status.success());
    assert_eq!(output.status.signal(), Some(libc::SIGSEGV));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fatal signal SIGSEGV"), "stderr: {stderr}");
    assert!(stderr.contains("\"application\":\"ferryd\""));
    assert!(stderr.contains("\"version\""));
}

#[test]
fn test_no_crash_report_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let port_arg = port.to_string();

    let child = spawn_broker(&[
        "-D",
        "-b",
        "-n",
        "10.0.0.5",
        "-p",
        &port_arg,
        "-c",
        dir.path().join("config.json").to_str().unwrap(),
        "-q",
        dir.path().join("queues").to_str().unwrap(),
    ]);

    assert!(wait_for_port(port, Duration::from_secs(10)));
    let output = signal_and_collect(child, libc::SIGSEGV);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("fatal signal"));
}
