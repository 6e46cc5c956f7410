//! Crash-loop accounting for supervised agents.
//!
//! Each agent session the daemon supervises gets restart tracking with
//! exponential backoff. Too many crashes inside the window open the
//! circuit: the daemon stops restarting the agent until an operator clears
//! the backoff. State is persisted under `daemon/restart-state.json` so a
//! daemon restart does not reset the counters.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::paths;

/// Crashes within the window before the circuit opens.
pub const DEFAULT_MAX_CRASHES: u32 = 5;

/// Window for counting crashes.
pub const DEFAULT_CRASH_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Uptime before a run counts as healthy and resets the crash streak.
pub const MIN_HEALTHY_UPTIME: Duration = Duration::from_secs(60);

const BACKOFF_INITIAL: Duration = Duration::from_secs(5);
const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Restart policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Crashes within the window before entering backoff.
    pub max_crashes: u32,
    /// Window for counting crashes.
    pub window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_crashes: DEFAULT_MAX_CRASHES,
            window: DEFAULT_CRASH_WINDOW,
        }
    }
}

/// Persisted per-agent restart state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRestartState {
    /// Consecutive crashes since the last healthy run.
    #[serde(default)]
    pub consecutive_crashes: u32,

    /// Crash timestamps inside the current window.
    #[serde(default)]
    pub crash_times: Vec<DateTime<Utc>>,

    /// When the agent was last (re)started.
    #[serde(default)]
    pub last_restart: Option<DateTime<Utc>>,

    /// Whether the circuit is open (no more restarts).
    #[serde(default)]
    pub backoff: bool,

    /// When the circuit opened.
    #[serde(default)]
    pub backoff_since: Option<DateTime<Utc>>,
}

/// What the supervisor should do after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after waiting this long.
    RestartAfter(Duration),
    /// Circuit open: stop restarting until cleared.
    Backoff,
}

/// Tracks restart decisions for all supervised agents, persisted to disk.
#[derive(Debug)]
pub struct RestartTracker {
    path: PathBuf,
    policy: RestartPolicy,
    agents: HashMap<String, AgentRestartState>,
}

impl RestartTracker {
    /// Load the tracker from `daemon/restart-state.json`. A missing file is
    /// an empty tracker; an unreadable one is logged and treated as empty.
    #[must_use]
    pub fn load(town_root: &Path, policy: RestartPolicy) -> Self {
        let path = paths::restart_state_file(town_root);
        let agents = read_state(&path);
        Self {
            path,
            policy,
            agents,
        }
    }

    /// Re-read persisted state, replacing in-memory counters. Invoked on
    /// SIGHUP after an operator clears a backoff.
    pub fn reload(&mut self) {
        self.agents = read_state(&self.path);
    }

    /// Persist current state atomically.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the write fails.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.agents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Record a crash and decide whether to restart.
    pub fn record_crash(&mut self, agent: &str, now: DateTime<Utc>) -> RestartDecision {
        let window = chrono::Duration::from_std(self.policy.window).unwrap_or_default();
        let max_crashes = self.policy.max_crashes;
        let state = self.agents.entry(agent.to_string()).or_default();

        state.consecutive_crashes += 1;
        state.crash_times.push(now);
        let window_start = now - window;
        state.crash_times.retain(|t| *t >= window_start);

        let decision = if state.crash_times.len() >= max_crashes as usize {
            state.backoff = true;
            state.backoff_since = Some(now);
            RestartDecision::Backoff
        } else {
            RestartDecision::RestartAfter(backoff_delay(state.consecutive_crashes))
        };

        self.persist();
        decision
    }

    /// Record that an agent was (re)started now.
    pub fn record_restart(&mut self, agent: &str, now: DateTime<Utc>) {
        self.agents.entry(agent.to_string()).or_default().last_restart = Some(now);
        self.persist();
    }

    /// Record that an agent is running. Resets the crash streak once the
    /// run has outlived the minimum healthy uptime.
    pub fn record_healthy(&mut self, agent: &str, now: DateTime<Utc>) {
        let Some(state) = self.agents.get_mut(agent) else {
            return;
        };
        if state.consecutive_crashes == 0 {
            return;
        }
        let healthy = state.last_restart.is_none_or(|started| {
            now - started >= chrono::Duration::from_std(MIN_HEALTHY_UPTIME).unwrap_or_default()
        });
        if healthy {
            state.consecutive_crashes = 0;
            state.crash_times.clear();
            self.persist();
        }
    }

    /// Whether the agent's circuit is open.
    #[must_use]
    pub fn in_backoff(&self, agent: &str) -> bool {
        self.agents.get(agent).is_some_and(|s| s.backoff)
    }

    /// Reset all tracking for an agent.
    pub fn clear(&mut self, agent: &str) {
        self.agents.remove(agent);
        self.persist();
    }

    /// Current state for an agent, if any.
    #[must_use]
    pub fn state(&self, agent: &str) -> Option<&AgentRestartState> {
        self.agents.get(agent)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(path = %self.path.display(), error = %e, "cannot persist restart state");
        }
    }
}

/// Exponential restart delay for the given consecutive-crash count, capped.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = BACKOFF_INITIAL.saturating_mul(1u32 << exp);
    delay.min(BACKOFF_MAX)
}

/// Clear persisted backoff for one agent without going through a tracker.
/// Used by the CLI; the running daemon reloads on SIGHUP.
///
/// # Errors
///
/// Returns the underlying I/O error when the state file cannot be written.
pub fn clear_agent_backoff(town_root: &Path, agent: &str) -> io::Result<()> {
    let mut tracker = RestartTracker::load(town_root, RestartPolicy::default());
    tracker.agents.remove(agent);
    tracker.save()
}

fn read_state(path: &Path) -> HashMap<String, AgentRestartState> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read restart state, starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(agents) => agents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt restart state, starting empty");
            HashMap::new()
        }
    }
}
