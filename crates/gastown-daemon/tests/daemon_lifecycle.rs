//! End-to-end daemon lifecycle: singleton lock, heartbeat state, quiet
//! second instance, graceful SIGTERM shutdown.

#![cfg(unix)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use gastown_daemon::lock;
use gastown_daemon::state::DaemonState;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn spawn_daemon(town_root: &std::path::Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_gastown-daemon"))
        .arg("--town-root")
        .arg(town_root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawning daemon binary")
}

fn wait_for<F: FnMut() -> bool>(mut condition: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn daemon_lifecycle_round_trip() {
    let town = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(town.path().join("mayor")).unwrap();

    let mut child = spawn_daemon(town.path());

    wait_for(
        || lock::is_running(town.path()).unwrap().is_some(),
        "daemon to take the lock",
    );
    let pid = lock::is_running(town.path()).unwrap().unwrap();
    assert_eq!(pid, child.id() as i32, "spawned child won the race");

    wait_for(
        || {
            DaemonState::load(town.path())
                .map(|s| s.pid == child.id())
                .unwrap_or(false)
        },
        "heartbeat state to appear",
    );
    let state = DaemonState::load(town.path()).unwrap();
    assert!(state.started_at.is_some());

    // A second daemon loses the race and exits quietly with success.
    let mut loser = spawn_daemon(town.path());
    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = loser.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "second daemon should exit");
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success(), "losing the race is not an error");
    assert_eq!(
        lock::is_running(town.path()).unwrap(),
        Some(pid),
        "original daemon still holds the lock"
    );

    // SIGTERM: clean shutdown removes the PID file.
    kill(Pid::from_raw(pid), Signal::SIGTERM).unwrap();
    wait_for(
        || child.try_wait().unwrap().is_some(),
        "daemon to exit on SIGTERM",
    );
    wait_for(
        || lock::read_pid(town.path()).unwrap().is_none(),
        "pid file removal",
    );

    // The daemon log landed where status and `gt daemon logs` expect it.
    assert!(gastown_core::paths::daemon_log(town.path()).exists());
}
