//! Supervision of daemon-owned children.
//!
//! Two kinds of children: the Dolt SQL server (a direct child process
//! whose stdout/stderr append to `daemon/dolt-server.log`, which is why
//! those logs need copy-truncate rotation) and agent sessions in the
//! terminal multiplexer. The supervision tick drives a per-child state
//! machine (unknown, running, crashed, backoff) with exponential restart
//! delays and a persisted crash-loop circuit.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gastown_core::config::{AgentSessionConfig, DaemonConfig, DoltServerConfig};
use gastown_core::paths;
use gastown_core::restart::{RestartDecision, RestartPolicy, RestartTracker};
use gastown_core::session::{SessionHost, SessionState};
use tracing::{info, warn};

/// How often the supervision tick runs.
pub const SUPERVISION_INTERVAL: Duration = Duration::from_secs(15);

/// Tracker key for the Dolt server child.
const DOLT_CHILD: &str = "dolt-server";

const DOLT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns and restarts the daemon's children.
pub struct ChildSupervisor {
    town_root: PathBuf,
    config: DaemonConfig,
    sessions: SessionHost,
    tracker: RestartTracker,
    dolt: Option<Child>,
    agent_states: HashMap<String, SessionState>,
    pending_restarts: HashMap<String, DateTime<Utc>>,
}

impl ChildSupervisor {
    /// Supervisor for the given town root and config.
    #[must_use]
    pub fn new(town_root: &Path, config: DaemonConfig, sessions: SessionHost) -> Self {
        let tracker = RestartTracker::load(town_root, RestartPolicy::default());
        Self {
            town_root: town_root.to_path_buf(),
            config,
            sessions,
            tracker,
            dolt: None,
            agent_states: HashMap::new(),
            pending_restarts: HashMap::new(),
        }
    }

    /// One supervision pass: check the Dolt child and every agent session,
    /// restarting what crashed, respecting backoff.
    pub fn tick(&mut self) {
        let now = Utc::now();
        self.supervise_dolt(now);
        for agent in self.config.agents.clone() {
            self.supervise_agent(&agent, now);
        }
    }

    /// Re-read persisted crash-loop state. Invoked on SIGHUP after an
    /// operator runs `gt daemon clear-backoff`.
    pub fn reload_tracker(&mut self) {
        info!("reloading restart tracker from disk");
        self.tracker.reload();
        // Cleared agents leave backoff; their next tick may restart them.
        let cleared: Vec<String> = self
            .agent_states
            .iter()
            .filter(|(id, state)| {
                **state == SessionState::Backoff && !self.tracker.in_backoff(id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in cleared {
            self.agent_states.insert(id, SessionState::Unknown);
            self.pending_restarts.clear();
        }
    }

    /// Observed state of one agent session.
    #[must_use]
    pub fn agent_state(&self, id: &str) -> SessionState {
        *self.agent_states.get(id).unwrap_or(&SessionState::Unknown)
    }

    /// Stop the Dolt child gracefully. Agent sessions are left running;
    /// they belong to their agents, not to this process.
    pub fn shutdown(&mut self) {
        let Some(mut child) = self.dolt.take() else {
            return;
        };
        info!("stopping dolt server child");

        #[cfg(unix)]
        {
            let pid = nix::unistd::Pid::from_raw(child.id() as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
        }

        let deadline = std::time::Instant::now() + DOLT_STOP_TIMEOUT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(%status, "dolt server exited");
                    return;
                }
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Ok(None) => {
                    warn!("dolt server ignored SIGTERM, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "waiting for dolt server");
                    return;
                }
            }
        }
    }

    fn supervise_dolt(&mut self, now: DateTime<Utc>) {
        let Some(cfg) = self.config.dolt_server.clone().filter(|c| c.enabled) else {
            return;
        };

        if let Some(child) = self.dolt.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    self.tracker.record_healthy(DOLT_CHILD, now);
                    return;
                }
                Ok(Some(status)) => {
                    warn!(%status, "dolt server crashed");
                    self.dolt = None;
                    match self.tracker.record_crash(DOLT_CHILD, now) {
                        RestartDecision::Backoff => {
                            warn!("dolt server crash loop: entering backoff");
                            return;
                        }
                        RestartDecision::RestartAfter(delay) => {
                            self.pending_restarts
                                .insert(DOLT_CHILD.to_string(), now + chrono_dur(delay));
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot poll dolt server");
                    return;
                }
            }
        }

        if self.tracker.in_backoff(DOLT_CHILD) || !self.restart_due(DOLT_CHILD, now) {
            return;
        }
        self.spawn_dolt(&cfg, now);
    }

    fn spawn_dolt(&mut self, cfg: &DoltServerConfig, now: DateTime<Utc>) {
        let daemon_dir = paths::daemon_dir(&self.town_root);
        let log_path = daemon_dir.join("dolt-server.log");
        let log = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(log) => log,
            Err(e) => {
                warn!(path = %log_path.display(), error = %e, "cannot open dolt server log");
                return;
            }
        };
        let log_err = match log.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                warn!(error = %e, "cannot clone dolt server log handle");
                return;
            }
        };

        let data_dir = cfg
            .data_dir
            .as_ref()
            .map_or_else(|| daemon_dir.clone(), |d| self.town_root.join(d));
        let port = cfg.port.to_string();

        let spawned = Command::new("dolt")
            .args(["sql-server", "--host", "127.0.0.1", "--port", &port])
            .current_dir(&data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn();

        match spawned {
            Ok(child) => {
                info!(pid = child.id(), port = cfg.port, "dolt server started");
                self.dolt = Some(child);
                self.pending_restarts.remove(DOLT_CHILD);
                self.tracker.record_restart(DOLT_CHILD, now);
            }
            Err(e) => warn!(error = %e, "cannot spawn dolt server"),
        }
    }

    fn supervise_agent(&mut self, agent: &AgentSessionConfig, now: DateTime<Utc>) {
        let id = agent.id.as_str();

        if self.tracker.in_backoff(id) {
            self.agent_states
                .insert(id.to_string(), SessionState::Backoff);
            return;
        }

        let exists = match self.sessions.exists(id) {
            Ok(exists) => exists,
            Err(e) => {
                warn!(agent = id, error = %e, "cannot probe session");
                return;
            }
        };

        if exists {
            self.agent_states
                .insert(id.to_string(), SessionState::Running);
            self.tracker.record_healthy(id, now);
            self.pending_restarts.remove(id);
            return;
        }

        // Session is gone. Only a transition out of Running counts as a
        // crash; an unknown session is simply not started yet.
        if self.agent_state(id) == SessionState::Running {
            warn!(agent = id, "agent session disappeared");
            match self.tracker.record_crash(id, now) {
                RestartDecision::Backoff => {
                    warn!(agent = id, "crash loop: entering backoff, not restarting");
                    self.agent_states
                        .insert(id.to_string(), SessionState::Backoff);
                    return;
                }
                RestartDecision::RestartAfter(delay) => {
                    info!(agent = id, ?delay, "scheduling agent restart");
                    self.pending_restarts
                        .insert(id.to_string(), now + chrono_dur(delay));
                }
            }
        }
        self.agent_states
            .insert(id.to_string(), SessionState::Crashed);

        if !self.restart_due(id, now) {
            return;
        }

        let cwd = agent.cwd.as_ref().map(|c| self.town_root.join(c));
        match self.sessions.spawn(id, &agent.command, cwd.as_deref()) {
            Ok(()) => {
                info!(agent = id, "agent session started");
                self.pending_restarts.remove(id);
                self.tracker.record_restart(id, now);
                self.agent_states
                    .insert(id.to_string(), SessionState::Running);
            }
            Err(e) => warn!(agent = id, error = %e, "cannot start agent session"),
        }
    }

    fn restart_due(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.pending_restarts
            .get(name)
            .is_none_or(|due| now >= *due)
    }
}

fn chrono_dur(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Fake multiplexer: `has-session` succeeds iff a flag file exists;
    /// everything else succeeds.
    fn fake_tmux(dir: &Path, flag: &Path) -> String {
        let script = dir.join("fake-tmux");
        let body = format!(
            "#!/bin/sh\nif [ \"$1\" = \"has-session\" ]; then test -f {}; else exit 0; fi\n",
            flag.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    fn config_with_agent() -> DaemonConfig {
        DaemonConfig {
            agents: vec![AgentSessionConfig {
                id: "deacon".to_string(),
                command: "gt deacon run".to_string(),
                cwd: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn missing_session_is_started_without_a_crash() {
        let town = tempfile::tempdir().unwrap();
        let flag = town.path().join("alive");
        let tmux = fake_tmux(town.path(), &flag);

        let mut supervisor = ChildSupervisor::new(
            town.path(),
            config_with_agent(),
            SessionHost::with_binary(tmux),
        );

        supervisor.tick();
        assert_eq!(supervisor.agent_state("deacon"), SessionState::Running);
        assert!(
            supervisor.tracker.state("deacon").unwrap().consecutive_crashes == 0,
            "first start is not a crash"
        );
    }

    #[test]
    fn running_session_that_vanishes_counts_as_crash() {
        let town = tempfile::tempdir().unwrap();
        let flag = town.path().join("alive");
        std::fs::write(&flag, b"").unwrap();
        let tmux = fake_tmux(town.path(), &flag);

        let mut supervisor = ChildSupervisor::new(
            town.path(),
            config_with_agent(),
            SessionHost::with_binary(tmux),
        );

        supervisor.tick();
        assert_eq!(supervisor.agent_state("deacon"), SessionState::Running);

        std::fs::remove_file(&flag).unwrap();
        supervisor.tick();

        let state = supervisor.tracker.state("deacon").unwrap();
        assert_eq!(state.consecutive_crashes, 1);
    }

    #[test]
    fn repeated_crashes_open_the_circuit() {
        let town = tempfile::tempdir().unwrap();
        let flag = town.path().join("alive");
        let tmux = fake_tmux(town.path(), &flag);

        let mut supervisor = ChildSupervisor::new(
            town.path(),
            config_with_agent(),
            SessionHost::with_binary(tmux),
        );

        // Alternate exists/gone enough times to trip the breaker.
        for _ in 0..6 {
            std::fs::write(&flag, b"").unwrap();
            supervisor.tick();
            std::fs::remove_file(&flag).unwrap();
            supervisor.tick();
        }

        assert_eq!(supervisor.agent_state("deacon"), SessionState::Backoff);
        assert!(supervisor.tracker.in_backoff("deacon"));
    }

    #[test]
    fn clear_and_reload_exits_backoff() {
        let town = tempfile::tempdir().unwrap();
        let flag = town.path().join("alive");
        let tmux = fake_tmux(town.path(), &flag);

        let mut supervisor = ChildSupervisor::new(
            town.path(),
            config_with_agent(),
            SessionHost::with_binary(tmux),
        );

        for _ in 0..6 {
            std::fs::write(&flag, b"").unwrap();
            supervisor.tick();
            std::fs::remove_file(&flag).unwrap();
            supervisor.tick();
        }
        assert!(supervisor.tracker.in_backoff("deacon"));

        gastown_core::restart::clear_agent_backoff(town.path(), "deacon").unwrap();
        supervisor.reload_tracker();
        assert!(!supervisor.tracker.in_backoff("deacon"));

        supervisor.tick();
        assert_eq!(supervisor.agent_state("deacon"), SessionState::Running);
    }
}
