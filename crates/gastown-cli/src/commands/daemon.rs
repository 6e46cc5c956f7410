//! Daemon management commands.
//!
//! `start` spawns the daemon binary detached and verifies the PID in the
//! lock file matches the child it spawned; a mismatch means another daemon
//! won the singleton race, which is reported as already-running, not as a
//! failure.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use gastown_core::logrotate::LogRotator;
use gastown_core::paths;
use gastown_core::restart;
use gastown_daemon::lock;
use gastown_daemon::state::DaemonState;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

const START_VERIFY_DELAY: Duration = Duration::from_millis(300);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_SYSTEMD_DIR: &str = ".config/systemd/user";
const LAUNCH_AGENTS_DIR: &str = "Library/LaunchAgents";

/// Systemd user unit installed by `gt daemon enable-supervisor`.
/// `%exe%` and `%root%` are replaced at install time.
const SYSTEMD_UNIT_TEMPLATE: &str = "\
[Unit]\n\
Description=Gas Town Daemon\n\
After=network-online.target\n\
\n\
[Service]\n\
ExecStart=%exe% --town-root %root%\n\
Restart=always\n\
RestartSec=5\n\
Environment=RUST_LOG=info\n\
\n\
[Install]\n\
WantedBy=default.target\n\
";

/// Launchd agent installed on macOS.
const LAUNCHD_PLIST_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.gastown.daemon</string>
    <key>ProgramArguments</key>
    <array>
        <string>%exe%</string>
        <string>--town-root</string>
        <string>%root%</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>
"#;

/// `gt daemon` subcommands.
#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start the daemon in the background
    Start,
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// View daemon logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
    /// Rotate daemon-managed log files
    RotateLogs {
        /// Rotate all logs regardless of size
        #[arg(long)]
        force: bool,
    },
    /// Clear crash loop backoff for an agent
    ClearBackoff {
        /// Agent session identity (e.g. "deacon")
        agent: String,
    },
    /// Configure launchd/systemd for daemon auto-restart
    EnableSupervisor,
}

/// Dispatch a daemon subcommand.
pub fn execute(town_root: &Path, command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => start(town_root),
        DaemonCommand::Stop => stop(town_root),
        DaemonCommand::Status => status(town_root),
        DaemonCommand::Logs { lines, follow } => logs(town_root, lines, follow),
        DaemonCommand::RotateLogs { force } => rotate_logs(town_root, force),
        DaemonCommand::ClearBackoff { agent } => clear_backoff(town_root, &agent),
        DaemonCommand::EnableSupervisor => enable_supervisor(town_root),
    }
}

/// Path to the daemon binary: prefer a sibling of the current executable,
/// fall back to `PATH`.
fn daemon_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("gastown-daemon");
            if sibling.is_file() {
                return sibling;
            }
        }
    }
    PathBuf::from("gastown-daemon")
}

fn start(town_root: &Path) -> Result<()> {
    if let Some(pid) = lock::is_running(town_root)? {
        bail!("daemon already running (PID {pid})");
    }

    let binary = daemon_binary();
    info!(binary = %binary.display(), "starting daemon");
    let child = Command::new(&binary)
        .arg("--town-root")
        .arg(town_root)
        .current_dir(town_root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("starting daemon")?;

    // Give the child a moment to take the lock, then verify.
    std::thread::sleep(START_VERIFY_DELAY);

    let Some(pid) = lock::is_running(town_root)? else {
        bail!("daemon failed to start (check logs with 'gt daemon logs')");
    };

    // If another concurrent start won the race, our child exited after
    // failing to take the lock and the PID file holds someone else's PID.
    if pid != child.id() as i32 {
        println!("● Daemon already running (PID {pid})");
        return Ok(());
    }

    println!("✓ Daemon started (PID {pid})");
    Ok(())
}

fn stop(town_root: &Path) -> Result<()> {
    let Some(pid) = lock::is_running(town_root)? else {
        bail!("daemon is not running");
    };

    kill(Pid::from_raw(pid), Signal::SIGTERM).context("signaling daemon")?;

    let deadline = std::time::Instant::now() + STOP_TIMEOUT;
    while std::time::Instant::now() < deadline {
        if lock::is_running(town_root)?.is_none() {
            // A crash would leave the PID file behind; sweep it.
            if lock::read_pid(town_root)?.is_some() {
                let _ = std::fs::remove_file(paths::pid_file(town_root));
            }
            println!("✓ Daemon stopped (was PID {pid})");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    bail!("daemon did not exit within {}s", STOP_TIMEOUT.as_secs())
}

fn status(town_root: &Path) -> Result<()> {
    let Some(pid) = lock::is_running(town_root)? else {
        println!("○ Daemon is not running");
        println!("\nStart with: gt daemon start");
        return Ok(());
    };

    println!("● Daemon is running (PID {pid})");
    println!("  Town: {}", town_root.display());

    let state = DaemonState::load(town_root).unwrap_or_default();
    let now = Utc::now();
    if let Some(started) = state.started_at {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
        if let Some(uptime) = state.uptime(now) {
            println!("  Uptime: {}", format_duration(uptime));
        }
    }
    if let Some(beat) = state.last_heartbeat {
        println!(
            "  Last heartbeat: {} (#{})",
            beat.format("%H:%M:%S"),
            state.heartbeat_count
        );
    }

    if let (Some(started), Ok(modified)) = (state.started_at, binary_mtime()) {
        println!("  Binary: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        if modified > started {
            println!("  ⚠ Binary is newer than process - consider 'gt daemon stop && gt daemon start'");
        }
    }

    Ok(())
}

fn binary_mtime() -> Result<DateTime<Utc>> {
    let info = std::fs::metadata(daemon_binary())?;
    Ok(DateTime::from(info.modified()?))
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn logs(town_root: &Path, lines: usize, follow: bool) -> Result<()> {
    let log_file = paths::daemon_log(town_root);
    if !log_file.exists() {
        bail!("no log file found at {}", log_file.display());
    }

    if follow {
        let status = Command::new("tail")
            .arg("-f")
            .arg(&log_file)
            .status()
            .context("running tail -f")?;
        if !status.success() {
            bail!("tail exited with {status}");
        }
        return Ok(());
    }

    let contents = std::fs::read_to_string(&log_file)
        .with_context(|| format!("reading {}", log_file.display()))?;
    let all: Vec<&str> = contents.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(())
}

fn rotate_logs(town_root: &Path, force: bool) -> Result<()> {
    let rotator = LogRotator::new();
    let result = if force {
        rotator.force_rotate(town_root)
    } else {
        rotator.rotate(town_root)
    };

    for path in &result.rotated {
        println!("✓ Rotated {}", path.display());
    }
    for path in &result.skipped {
        println!("  · {} (below threshold)", path.display());
    }
    for err in &result.errors {
        println!("  ⚠ {err}");
    }

    if result.rotated.is_empty() && result.errors.is_empty() {
        println!("✓ No logs needed rotation");
    }

    if !result.errors.is_empty() {
        bail!("failed to rotate {} log files", result.errors.len());
    }
    Ok(())
}

fn clear_backoff(town_root: &Path, agent: &str) -> Result<()> {
    restart::clear_agent_backoff(town_root, agent)
        .with_context(|| format!("clearing backoff for {agent}"))?;

    // A running daemon reloads its in-memory tracker on SIGHUP.
    match lock::is_running(town_root)? {
        Some(pid) => {
            kill(Pid::from_raw(pid), Signal::SIGHUP).context("signaling daemon to reload")?;
            println!("✓ Cleared backoff for {agent} (daemon reloaded)");
        }
        None => {
            println!(
                "✓ Cleared backoff for {agent} (daemon not running, will take effect on next start)"
            );
        }
    }
    Ok(())
}

fn enable_supervisor(town_root: &Path) -> Result<()> {
    let exe = daemon_binary();
    let exe = exe
        .canonicalize()
        .unwrap_or(exe)
        .display()
        .to_string();
    let root = town_root
        .canonicalize()
        .unwrap_or_else(|_| town_root.to_path_buf())
        .display()
        .to_string();
    let home = std::env::var("HOME").context("HOME environment variable not set")?;

    if cfg!(target_os = "macos") {
        let plist = LAUNCHD_PLIST_TEMPLATE
            .replace("%exe%", &exe)
            .replace("%root%", &root);
        let agents_dir = Path::new(&home).join(LAUNCH_AGENTS_DIR);
        std::fs::create_dir_all(&agents_dir).context("creating LaunchAgents directory")?;
        let plist_path = agents_dir.join("com.gastown.daemon.plist");
        std::fs::write(&plist_path, plist)
            .with_context(|| format!("writing {}", plist_path.display()))?;

        run_checked(Command::new("launchctl").arg("load").arg(&plist_path))?;
        println!("✓ Installed launchd agent at {}", plist_path.display());
        println!("\nTo stop the supervised daemon:");
        println!("  launchctl unload {}", plist_path.display());
    } else {
        let unit = SYSTEMD_UNIT_TEMPLATE
            .replace("%exe%", &exe)
            .replace("%root%", &root);
        let unit_dir = Path::new(&home).join(USER_SYSTEMD_DIR);
        std::fs::create_dir_all(&unit_dir).context("creating user systemd directory")?;
        let unit_path = unit_dir.join("gastown-daemon.service");
        std::fs::write(&unit_path, unit)
            .with_context(|| format!("writing {}", unit_path.display()))?;

        for args in [
            &["daemon-reload"][..],
            &["enable", "gastown-daemon.service"][..],
            &["start", "gastown-daemon.service"][..],
        ] {
            run_checked(Command::new("systemctl").arg("--user").args(args))?;
        }
        println!("✓ Installed systemd user unit at {}", unit_path.display());
        println!("\nTo stop the supervised daemon:");
        println!("  systemctl --user stop gastown-daemon.service");
        println!("  systemctl --user disable gastown-daemon.service");
    }

    println!("\nThe daemon will now:");
    println!("  - Auto-restart if it crashes");
    println!("  - Start automatically on login/boot");
    Ok(())
}

fn run_checked(cmd: &mut Command) -> Result<()> {
    let status = cmd.status().with_context(|| format!("running {cmd:?}"))?;
    if !status.success() {
        bail!("{cmd:?} failed with {status}");
    }
    Ok(())
}
