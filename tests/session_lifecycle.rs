//! Integration tests for remote session cleanup
//!
//! These tests verify that:
//! 1. ssh children spawned with as_session_leader() lead their own group
//! 2. terminate_all() takes down the whole group of every open session
//! 3. Termination runs at most once per registry

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rollover::process_guard::{SessionCommand, SessionRegistry};

/// Helper: Check if a process is alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Helper: Wait for a process to die with timeout
fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn test_session_gets_own_process_group() {
    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .as_session_leader()
        .spawn()
        .expect("spawn sleep");
    let pid = child.id();

    let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid as i32)))
        .expect("process group");
    assert_eq!(pgid.as_raw(), pid as i32, "session should lead its own group");

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn test_terminate_all_stops_registered_sessions() {
    // A shell with a grandchild, like ssh with a local helper
    let mut child = Command::new("sh")
        .args(["-c", "sleep 30 & wait"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .as_session_leader()
        .spawn()
        .expect("spawn shell");
    let pid = child.id();

    let mut registry = SessionRegistry::default();
    registry
        .open(pid, "ceph-node1", "ansible-playbook -vv -i hosts site.yml")
        .expect("registered before shutdown");
    assert_eq!(registry.count(), 1);

    // Reap in the background so the child does not linger as a zombie
    let reaper = thread::spawn(move || child.wait());

    registry.terminate_all(Duration::from_secs(2));
    assert_eq!(registry.count(), 0);
    assert!(
        wait_for_process_death(pid, Duration::from_secs(5)),
        "session should be gone after terminate_all"
    );
    let _ = reaper.join();
}

#[test]
fn test_session_opened_during_shutdown_is_killed() {
    let mut registry = SessionRegistry::default();
    registry.terminate_all(Duration::from_millis(10));

    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .as_session_leader()
        .spawn()
        .expect("spawn sleep");
    let pid = child.id();
    let reaper = thread::spawn(move || child.wait());

    assert!(registry.open(pid, "ceph-node2", "sleep 30").is_none());
    assert_eq!(registry.count(), 0);
    assert!(
        wait_for_process_death(pid, Duration::from_secs(5)),
        "late session should be killed"
    );
    let _ = reaper.join();
}
